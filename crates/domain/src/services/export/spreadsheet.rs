use std::io::{BufWriter, Write};

use super::{drive_rows, ExportContext, ExportError, ExportOutcome, ExportStrategy, ProgressFn};
use crate::models::ExportFormat;
use crate::services::adapter::{CellValue, ReportAdapter};

/// Single-worksheet SpreadsheetML 2003 workbook with a bold, frozen header
/// row and typed cells.
pub struct SpreadsheetStrategy;

const WORKBOOK_OPEN: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<?mso-application progid="Excel.Sheet"?>
<Workbook xmlns="urn:schemas-microsoft-com:office:spreadsheet" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel" xmlns:ss="urn:schemas-microsoft-com:office:spreadsheet">
 <Styles>
  <Style ss:ID="header"><Font ss:Bold="1"/><Interior ss:Color="#D9E1F2" ss:Pattern="Solid"/></Style>
  <Style ss:ID="date"><NumberFormat ss:Format="yyyy-mm-dd"/></Style>
  <Style ss:ID="datetime"><NumberFormat ss:Format="yyyy-mm-dd hh:mm:ss"/></Style>
  <Style ss:ID="decimal"><NumberFormat ss:Format="0.00"/></Style>
 </Styles>
"##;

const WORKSHEET_CLOSE: &str = r#"  </Table>
  <WorksheetOptions xmlns="urn:schemas-microsoft-com:office:excel">
   <FreezePanes/>
   <FrozenNoSplit/>
   <SplitHorizontal>1</SplitHorizontal>
   <TopRowBottomPane>1</TopRowBottomPane>
   <ActivePane>2</ActivePane>
  </WorksheetOptions>
 </Worksheet>
</Workbook>
"#;

/// Escapes XML special characters and drops control characters XML 1.0
/// cannot carry.
pub(crate) fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' => escaped.push_str("&#10;"),
            '\t' | '\r' => escaped.push(c),
            c if (c as u32) < 0x20 => {}
            c => escaped.push(c),
        }
    }
    escaped
}

/// Worksheet names are limited to 31 characters and may not contain
/// `[]:*?/\`.
fn sheet_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "Report".to_string()
    } else {
        cleaned.to_string()
    }
}

fn cell_xml(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => "<Cell/>".to_string(),
        CellValue::Text(s) => format!("<Cell><Data ss:Type=\"String\">{}</Data></Cell>", escape_xml(s)),
        CellValue::Integer(i) => format!("<Cell><Data ss:Type=\"Number\">{}</Data></Cell>", i),
        CellValue::Decimal(d) | CellValue::Percentage(d) if d.is_finite() => format!(
            "<Cell ss:StyleID=\"decimal\"><Data ss:Type=\"Number\">{}</Data></Cell>",
            d
        ),
        CellValue::Decimal(_) | CellValue::Percentage(_) => "<Cell/>".to_string(),
        CellValue::Date(d) => format!(
            "<Cell ss:StyleID=\"date\"><Data ss:Type=\"DateTime\">{}T00:00:00.000</Data></Cell>",
            d.format("%Y-%m-%d")
        ),
        CellValue::DateTime(dt) => format!(
            "<Cell ss:StyleID=\"datetime\"><Data ss:Type=\"DateTime\">{}</Data></Cell>",
            dt.format("%Y-%m-%dT%H:%M:%S%.3f")
        ),
        CellValue::Boolean(b) => format!(
            "<Cell><Data ss:Type=\"Boolean\">{}</Data></Cell>",
            u8::from(*b)
        ),
    }
}

impl ExportStrategy for SpreadsheetStrategy {
    fn format(&self) -> ExportFormat {
        ExportFormat::Spreadsheet
    }

    fn export(
        &self,
        adapter: &dyn ReportAdapter,
        ctx: &ExportContext,
        out: &mut dyn Write,
        progress: &mut ProgressFn<'_>,
    ) -> Result<ExportOutcome, ExportError> {
        let mut out = BufWriter::new(out);
        let columns = adapter.columns();

        out.write_all(WORKBOOK_OPEN.as_bytes())?;
        writeln!(out, " <Worksheet ss:Name=\"{}\">", escape_xml(&sheet_name(&ctx.title)))?;
        writeln!(out, "  <Table>")?;
        out.write_all(b"   <Row>")?;
        for column in &columns {
            write!(
                out,
                "<Cell ss:StyleID=\"header\"><Data ss:Type=\"String\">{}</Data></Cell>",
                escape_xml(column.label)
            )?;
        }
        out.write_all(b"</Row>\n")?;

        let outcome = drive_rows(adapter, ctx, None, progress, |_, row| {
            out.write_all(b"   <Row>")?;
            for cell in row {
                out.write_all(cell_xml(cell).as_bytes())?;
            }
            out.write_all(b"</Row>\n")?;
            Ok(())
        })?;

        out.write_all(WORKSHEET_CLOSE.as_bytes())?;
        out.flush()?;
        Ok(outcome)
    }
}
