//! Markdown export: one section per record, labelled lines, description as body.

use crate::core::error::ExportError;
use crate::core::types::{Mode, Record};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::Path;

const HEADING_FIELDS: &[&str] = &["Title", "Name"];
const BODY_FIELD: &str = "Description";

pub fn render(mode: Mode, records: &[&Record], at: DateTime<Local>) -> String {
    let headers = Record::headers(mode);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# {} export ({} records)\n\n_Generated {}_\n",
        capitalize(mode.label()),
        records.len(),
        at.format("%Y-%m-%d %H:%M")
    );

    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push_str("\n---\n\n");
        }
        let cells = record.cells();
        let field = |name: &str| {
            headers
                .iter()
                .position(|h| *h == name)
                .and_then(|idx| cells.get(idx))
                .map(|v| v.trim())
                .unwrap_or_default()
        };

        let heading = HEADING_FIELDS
            .iter()
            .map(|f| field(f))
            .find(|v| !v.is_empty())
            .unwrap_or("(untitled)");
        let _ = writeln!(out, "## {}\n", heading);

        for (header, value) in headers.iter().zip(cells.iter()) {
            let value = value.trim();
            if value.is_empty() || HEADING_FIELDS.contains(header) || *header == BODY_FIELD {
                continue;
            }
            let _ = writeln!(out, "**{}:** {}  ", header, value);
        }

        let body = field(BODY_FIELD);
        if !body.is_empty() {
            let _ = writeln!(out, "\n{}", body);
        }
    }
    out
}

pub fn write(
    path: &Path,
    mode: Mode,
    records: &[&Record],
    at: DateTime<Local>,
) -> Result<(), ExportError> {
    std::fs::write(path, render(mode, records, at))?;
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
