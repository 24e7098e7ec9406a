use serde_json::json;
use std::io::{BufWriter, Write};

use super::{drive_rows, ExportContext, ExportError, ExportOutcome, ExportStrategy, ProgressFn};
use crate::models::ExportFormat;
use crate::services::adapter::ReportAdapter;

/// JSON document streamed row by row:
///
/// ```json
/// { "report": {...}, "columns": [...], "rows": [{...}], "total_records": 2 }
/// ```
///
/// Row objects keep the column order.
pub struct StructuredDataStrategy;

impl ExportStrategy for StructuredDataStrategy {
    fn format(&self) -> ExportFormat {
        ExportFormat::StructuredData
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

        let report = json!({
            "id": ctx.job_id,
            "title": ctx.title,
            "report_type": ctx.report_type,
            "generated_at": ctx.generated_at.to_rfc3339(),
            "parameters": ctx.parameters.to_json(),
        });
        let column_meta: Vec<_> = columns
            .iter()
            .map(|c| json!({"key": c.key, "label": c.label, "type": c.column_type.as_str()}))
            .collect();

        out.write_all(b"{\"report\":")?;
        serde_json::to_writer(&mut out, &report)?;
        out.write_all(b",\"columns\":")?;
        serde_json::to_writer(&mut out, &column_meta)?;
        out.write_all(b",\"rows\":[")?;

        let mut first = true;
        let outcome = drive_rows(adapter, ctx, None, progress, |columns, row| {
            if !first {
                out.write_all(b",")?;
            }
            first = false;
            out.write_all(b"{")?;
            for (i, (column, cell)) in columns.iter().zip(row).enumerate() {
                if i > 0 {
                    out.write_all(b",")?;
                }
                serde_json::to_writer(&mut out, column.key)?;
                out.write_all(b":")?;
                serde_json::to_writer(&mut out, &cell.to_json())?;
            }
            out.write_all(b"}")?;
            Ok(())
        })?;

        write!(out, "],\"total_records\":{}}}", outcome.rows_written)?;
        out.flush()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::export::test_support::{context, run, NumberedAdapter};
    use serde_json::Value;

    #[test]
    fn test_document_shape() {
        let (result, bytes, _) = run(&StructuredDataStrategy, NumberedAdapter::new(3), &context());
        let outcome = result.unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["report"]["title"], "Numbers");
        assert_eq!(doc["report"]["report_type"], "summary");
        assert_eq!(doc["columns"].as_array().unwrap().len(), 3);
        assert_eq!(doc["columns"][2]["type"], "percentage");
        assert_eq!(doc["total_records"], 3);
        assert_eq!(outcome.rows_written, 3);

        let rows = doc["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["n"], 1);
        assert_eq!(rows[0]["label"], Value::Null);
        assert_eq!(rows[1]["label"], "row \"2\"");
    }

    #[test]
    fn test_empty_rows_array() {
        let (result, bytes, _) = run(&StructuredDataStrategy, NumberedAdapter::new(0), &context());
        result.unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["rows"], Value::Array(vec![]));
        assert_eq!(doc["total_records"], 0);
    }

    #[test]
    fn test_row_keys_keep_column_order() {
        let (result, bytes, _) = run(&StructuredDataStrategy, NumberedAdapter::new(1), &context());
        result.unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("{\"n\":1,\"label\":null,\"ratio\":1.0}"));
    }
}
