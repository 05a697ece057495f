//! CSV export (people only): every field quoted, quotes doubled.

use crate::core::error::ExportError;
use crate::core::types::{ExportFormat, Mode, Record};
use std::path::Path;

pub fn write(path: &Path, mode: Mode, records: &[&Record]) -> Result<(), ExportError> {
    let mut writer = ::csv::WriterBuilder::new()
        .quote_style(::csv::QuoteStyle::Always)
        .from_path(path)?;
    write_rows(&mut writer, mode, records)?;
    writer.flush()?;
    Ok(())
}

fn write_rows<W: std::io::Write>(
    writer: &mut ::csv::Writer<W>,
    mode: Mode,
    records: &[&Record],
) -> Result<(), ExportError> {
    if !ExportFormat::Csv.supports(mode) {
        return Err(ExportError::Unsupported {
            format: ExportFormat::Csv,
            mode,
        });
    }
    writer.write_record(Record::headers(mode))?;
    for record in records {
        writer.write_record(record.cells())?;
    }
    Ok(())
}
