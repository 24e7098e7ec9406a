use std::io::{BufWriter, Write};

use super::{drive_rows, ExportContext, ExportError, ExportOutcome, ExportStrategy, ProgressFn};
use crate::models::ExportFormat;
use crate::services::adapter::ReportAdapter;

/// Comma separated values with a UTF-8 BOM for spreadsheet compatibility.
pub struct DelimitedTextStrategy;

/// Escape a value for CSV output.
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_record(out: &mut impl Write, fields: impl Iterator<Item = String>) -> std::io::Result<()> {
    let line: Vec<String> = fields.map(|f| escape_csv(&f)).collect();
    out.write_all(line.join(",").as_bytes())?;
    out.write_all(b"\n")
}

impl ExportStrategy for DelimitedTextStrategy {
    fn format(&self) -> ExportFormat {
        ExportFormat::DelimitedText
    }

    fn export(
        &self,
        adapter: &dyn ReportAdapter,
        ctx: &ExportContext,
        out: &mut dyn Write,
        progress: &mut ProgressFn<'_>,
    ) -> Result<ExportOutcome, ExportError> {
        let mut out = BufWriter::new(out);

        out.write_all("\u{FEFF}".as_bytes())?;
        write_record(&mut out, adapter.columns().iter().map(|c| c.label.to_string()))?;

        let outcome = drive_rows(adapter, ctx, None, progress, |_, row| {
            write_record(&mut out, row.iter().map(|cell| cell.to_plain_string()))?;
            Ok(())
        })?;

        out.flush()?;
        Ok(outcome)
    }
}
