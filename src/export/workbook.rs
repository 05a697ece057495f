//! XLSX export via `rust_xlsxwriter`.

use crate::core::error::ExportError;
use crate::core::types::{Mode, Record};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

/// Excel refuses cell strings longer than this.
const MAX_CELL_CHARS: usize = 32_767;

fn cell_text(value: &str) -> String {
    if value.chars().count() > MAX_CELL_CHARS {
        value.chars().take(MAX_CELL_CHARS).collect()
    } else {
        value.to_string()
    }
}

fn column_width(header: &str) -> f64 {
    match header {
        "Description" => 80.0,
        "Job URL" | "Apply URL" | "Company URL" | "Profile URL" => 45.0,
        "Title" | "Name" | "Company" => 30.0,
        _ => 18.0,
    }
}

/// One sheet: a bold header row, then one row per record.
pub fn write(path: &Path, mode: Mode, records: &[&Record]) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(mode.label())?;

    let headers = Record::headers(mode);
    for (col, header) in headers.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *header, &header_format)?;
        sheet.set_column_width(col, column_width(header))?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (row, record) in records.iter().enumerate() {
        let row = row as u32 + 1;
        for (col, value) in record.cells().into_iter().enumerate() {
            sheet.write_string(row, col as u16, cell_text(value))?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_cells_are_truncated() {
        let long = "x".repeat(MAX_CELL_CHARS + 10);
        assert_eq!(cell_text(&long).chars().count(), MAX_CELL_CHARS);
        assert_eq!(cell_text("short"), "short");
    }
}
