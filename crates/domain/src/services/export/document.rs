//! Self-contained PDF 1.4 output.
//!
//! Layout: A4 landscape, built-in Helvetica fonts with WinAnsi encoding, a
//! title block and column header on every page, page numbers in the footer.
//! Pages are streamed as soon as they fill up; the page tree object is
//! written last so the page count need not be known in advance.
//!
//! Object numbers: 1 catalog, 2 page tree, 3 and 4 fonts, 5 document info,
//! then one content stream and one page object per page from 6 on.

use std::io::{self, BufWriter, Write};

use super::{drive_rows, ExportContext, ExportError, ExportOutcome, ExportStrategy, ProgressFn};
use crate::models::ExportFormat;
use crate::services::adapter::{ColumnDef, ReportAdapter};

/// Row-capped PDF table.
pub struct PaginatedDocumentStrategy;

const PAGE_WIDTH: f64 = 842.0;
const PAGE_HEIGHT: f64 = 595.0;
const MARGIN: f64 = 36.0;
const TITLE_SIZE: f64 = 12.0;
const BODY_SIZE: f64 = 8.0;
const HEADER_Y: f64 = 515.0;
const FIRST_ROW_Y: f64 = 500.0;
const ROW_HEIGHT: f64 = 12.0;
const ROWS_PER_PAGE: usize = 38;
const FOOTER_Y: f64 = 24.0;
/// Average Helvetica glyph width relative to the font size.
const GLYPH_WIDTH: f64 = 0.5;

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const FONT_REGULAR_ID: usize = 3;
const FONT_BOLD_ID: usize = 4;
const INFO_ID: usize = 5;
const FIRST_PAGE_ID: usize = 6;

/// Encodes text as a PDF literal string in WinAnsi. Characters outside
/// Latin-1 become `?`.
fn pdf_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(b'(');
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            '\n' | '\r' | '\t' => out.push(b' '),
            c if (' '..='~').contains(&c) => out.push(c as u8),
            c if ('\u{A0}'..='\u{FF}').contains(&c) => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out.push(b')');
    out
}

/// Shortens `text` to `max_chars`, marking the cut with `...`.
fn fit(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut shortened: String = text.chars().take(keep).collect();
    shortened.push_str("...");
    shortened
}

/// Byte-counting object writer that records xref offsets.
struct PdfWriter<W: Write> {
    out: W,
    offset: u64,
    offsets: Vec<Option<u64>>,
}

impl<W: Write> PdfWriter<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            offsets: Vec::new(),
        }
    }

    fn raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn object(&mut self, id: usize, body: &[u8]) -> io::Result<()> {
        if self.offsets.len() <= id {
            self.offsets.resize(id + 1, None);
        }
        self.offsets[id] = Some(self.offset);
        self.raw(format!("{} 0 obj\n", id).as_bytes())?;
        self.raw(body)?;
        self.raw(b"\nendobj\n")
    }

    fn stream(&mut self, id: usize, content: &[u8]) -> io::Result<()> {
        let mut body = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(b"\nendstream");
        self.object(id, &body)
    }

    /// Writes the cross-reference table and trailer.
    fn finish(mut self) -> io::Result<W> {
        let xref_offset = self.offset;
        let size = self.offsets.len().max(1);
        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for entry in self.offsets.iter().skip(1) {
            match entry {
                Some(offset) => table.push_str(&format!("{:010} 00000 n \n", offset)),
                None => table.push_str("0000000000 65535 f \n"),
            }
        }
        table.push_str(&format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, CATALOG_ID, INFO_ID, xref_offset
        ));
        self.raw(table.as_bytes())?;
        Ok(self.out)
    }
}

/// Content stream of the page being filled.
struct Page {
    number: usize,
    content: Vec<u8>,
    rows: usize,
}

struct Layout {
    title: String,
    subtitle: String,
    labels: Vec<String>,
    column_width: f64,
    max_chars: usize,
}

impl Layout {
    fn new(ctx: &ExportContext, columns: &[ColumnDef]) -> Self {
        let count = columns.len().max(1);
        let column_width = (PAGE_WIDTH - 2.0 * MARGIN) / count as f64;
        let max_chars = ((column_width / (BODY_SIZE * GLYPH_WIDTH)) as usize).saturating_sub(1).max(4);
        Self {
            title: ctx.title.clone(),
            subtitle: format!(
                "{} report, generated {}",
                ctx.report_type.label(),
                ctx.generated_at.format("%Y-%m-%d %H:%M UTC")
            ),
            labels: columns.iter().map(|c| fit(c.label, max_chars)).collect(),
            column_width,
            max_chars,
        }
    }
}

fn text(content: &mut Vec<u8>, font: &str, size: f64, x: f64, y: f64, value: &str) {
    content.extend_from_slice(format!("BT /{} {} Tf {:.2} {:.2} Td ", font, size, x, y).as_bytes());
    content.extend_from_slice(&pdf_string(value));
    content.extend_from_slice(b" Tj ET\n");
}

impl Page {
    fn start(number: usize, layout: &Layout) -> Self {
        let mut content = Vec::new();
        text(&mut content, "F2", TITLE_SIZE, MARGIN, PAGE_HEIGHT - MARGIN - TITLE_SIZE, &layout.title);
        text(&mut content, "F1", BODY_SIZE, MARGIN, PAGE_HEIGHT - MARGIN - 26.0, &layout.subtitle);
        for (i, label) in layout.labels.iter().enumerate() {
            let x = MARGIN + i as f64 * layout.column_width;
            text(&mut content, "F2", BODY_SIZE, x, HEADER_Y, label);
        }
        let rule_y = HEADER_Y - 4.0;
        content.extend_from_slice(
            format!(
                "0.5 w {:.2} {:.2} m {:.2} {:.2} l S\n",
                MARGIN,
                rule_y,
                PAGE_WIDTH - MARGIN,
                rule_y
            )
            .as_bytes(),
        );
        Self {
            number,
            content,
            rows: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.rows >= ROWS_PER_PAGE
    }

    fn next_y(&self) -> f64 {
        FIRST_ROW_Y - self.rows as f64 * ROW_HEIGHT
    }

    fn push_cells(&mut self, layout: &Layout, cells: &[String]) {
        let y = self.next_y();
        for (i, cell) in cells.iter().enumerate() {
            let x = MARGIN + i as f64 * layout.column_width;
            text(&mut self.content, "F1", BODY_SIZE, x, y, &fit(cell, layout.max_chars));
        }
        self.rows += 1;
    }

    fn push_note(&mut self, note: &str) {
        let y = self.next_y() - ROW_HEIGHT / 2.0;
        text(&mut self.content, "F2", BODY_SIZE, MARGIN, y, note);
        self.rows += 1;
    }
}

/// Streams pages to the PDF writer as they fill.
struct DocumentBuilder<W: Write> {
    pdf: PdfWriter<W>,
    layout: Layout,
    page: Page,
    page_ids: Vec<usize>,
}

impl<W: Write> DocumentBuilder<W> {
    fn begin(out: W, ctx: &ExportContext, layout: Layout) -> io::Result<Self> {
        let mut pdf = PdfWriter::new(out);
        pdf.raw(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n")?;
        pdf.object(
            CATALOG_ID,
            format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES_ID).as_bytes(),
        )?;
        pdf.object(
            FONT_REGULAR_ID,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        )?;
        pdf.object(
            FONT_BOLD_ID,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
        )?;

        let mut info = b"<< /Title ".to_vec();
        info.extend_from_slice(&pdf_string(&ctx.title));
        info.extend_from_slice(b" /Producer (Volunteer Reports) /CreationDate ");
        info.extend_from_slice(&pdf_string(&ctx.generated_at.format("D:%Y%m%d%H%M%SZ").to_string()));
        info.extend_from_slice(b" >>");
        pdf.object(INFO_ID, &info)?;

        let page = Page::start(1, &layout);
        Ok(Self {
            pdf,
            layout,
            page,
            page_ids: Vec::new(),
        })
    }

    fn next_ids(&self) -> (usize, usize) {
        let content_id = FIRST_PAGE_ID + self.page_ids.len() * 2;
        (content_id, content_id + 1)
    }

    fn flush_page(&mut self) -> io::Result<()> {
        let next = Page::start(self.page.number + 1, &self.layout);
        let mut page = std::mem::replace(&mut self.page, next);
        text(
            &mut page.content,
            "F1",
            BODY_SIZE,
            PAGE_WIDTH / 2.0 - 12.0,
            FOOTER_Y,
            &format!("Page {}", page.number),
        );

        let (content_id, page_id) = self.next_ids();
        self.pdf.stream(content_id, &page.content)?;
        self.pdf.object(
            page_id,
            format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 {} 0 R /F2 {} 0 R >> >> /Contents {} 0 R >>",
                PAGES_ID, PAGE_WIDTH, PAGE_HEIGHT, FONT_REGULAR_ID, FONT_BOLD_ID, content_id
            )
            .as_bytes(),
        )?;
        self.page_ids.push(page_id);
        Ok(())
    }

    fn row(&mut self, cells: &[String]) -> io::Result<()> {
        if self.page.is_full() {
            self.flush_page()?;
        }
        self.page.push_cells(&self.layout, cells);
        Ok(())
    }

    fn note(&mut self, note: &str) -> io::Result<()> {
        if self.page.is_full() {
            self.flush_page()?;
        }
        self.page.push_note(note);
        Ok(())
    }

    fn finish(mut self) -> io::Result<W> {
        self.flush_page()?;
        let kids: Vec<String> = self.page_ids.iter().map(|id| format!("{} 0 R", id)).collect();
        self.pdf.object(
            PAGES_ID,
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.join(" "),
                self.page_ids.len()
            )
            .as_bytes(),
        )?;
        self.pdf.finish()
    }
}

impl ExportStrategy for PaginatedDocumentStrategy {
    fn format(&self) -> ExportFormat {
        ExportFormat::PaginatedDocument
    }

    fn export(
        &self,
        adapter: &dyn ReportAdapter,
        ctx: &ExportContext,
        out: &mut dyn Write,
        progress: &mut ProgressFn<'_>,
    ) -> Result<ExportOutcome, ExportError> {
        let columns = adapter.columns();
        let layout = Layout::new(ctx, &columns);
        let mut doc = DocumentBuilder::begin(BufWriter::new(out), ctx, layout)?;

        let limit = ctx.document_row_limit.max(1);
        let outcome = drive_rows(adapter, ctx, Some(limit), progress, |_, row| {
            let cells: Vec<String> = row.iter().map(|c| c.to_plain_string()).collect();
            doc.row(&cells)?;
            Ok(())
        })?;

        if outcome.rows_written == 0 {
            doc.note("No records match the report parameters.")?;
        }
        if outcome.truncated {
            doc.note(&format!(
                "Output limited to the first {} rows. Export as delimited text, spreadsheet or structured data for the complete report.",
                limit
            ))?;
        }

        let mut out = doc.finish()?;
        out.flush()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::export::test_support::{context, run, NumberedAdapter};

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Checks that the xref table points at the right objects.
    fn assert_xref_consistent(bytes: &[u8]) {
        let text = as_text(bytes);
        let start: usize = text
            .rsplit("startxref\n")
            .next()
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!(bytes[start..].starts_with(b"xref\n"));

        let table = String::from_utf8(bytes[start..].to_vec()).unwrap();
        let entries: Vec<&str> = table
            .lines()
            .skip(3)
            .take_while(|l| !l.starts_with("trailer"))
            .collect();
        assert!(!entries.is_empty());
        for (i, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            let expected = format!("{} 0 obj", i + 1);
            assert!(bytes[offset..].starts_with(expected.as_bytes()), "object {}", i + 1);
        }
    }

    #[test]
    fn test_pdf_string_escaping() {
        assert_eq!(pdf_string("a(b)\\c"), b"(a\\(b\\)\\\\c)".to_vec());
        assert_eq!(pdf_string("caf\u{e9}"), b"(caf\xE9)".to_vec());
        assert_eq!(pdf_string("\u{2603}"), b"(?)".to_vec());
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("short", 10), "short");
        assert_eq!(fit("a very long value", 8), "a ver...");
    }

    #[test]
    fn test_single_page_document() {
        let (result, bytes, _) = run(&PaginatedDocumentStrategy, NumberedAdapter::new(10), &context());
        let outcome = result.unwrap();
        assert_eq!(outcome.rows_written, 10);
        assert!(!outcome.truncated);

        let text = as_text(&bytes);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("(Page 1)"));
        assert_xref_consistent(&bytes);
    }

    #[test]
    fn test_rows_span_pages() {
        let (result, bytes, _) = run(&PaginatedDocumentStrategy, NumberedAdapter::new(100), &context());
        result.unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("/Count 3"));
        assert!(text.contains("(Page 3)"));
        assert_eq!(text.matches("(Numbers)").count(), 4);
        assert_xref_consistent(&bytes);
    }

    #[test]
    fn test_row_cap_adds_note() {
        let mut ctx = context();
        ctx.document_row_limit = 50;
        let (result, bytes, updates) = run(&PaginatedDocumentStrategy, NumberedAdapter::new(60), &ctx);
        let outcome = result.unwrap();
        assert_eq!(outcome.rows_written, 50);
        assert!(outcome.truncated);
        assert_eq!(outcome.warnings(), 1);
        assert_eq!(updates.last().unwrap().percent, 95);

        let text = as_text(&bytes);
        assert!(text.contains("Output limited to the first 50 rows"));
        assert_xref_consistent(&bytes);
    }

    #[test]
    fn test_exact_limit_is_not_truncated() {
        let mut ctx = context();
        ctx.document_row_limit = 20;
        let (result, _, _) = run(&PaginatedDocumentStrategy, NumberedAdapter::new(20), &ctx);
        assert!(!result.unwrap().truncated);
    }

    #[test]
    fn test_empty_document_has_note() {
        let (result, bytes, _) = run(&PaginatedDocumentStrategy, NumberedAdapter::new(0), &context());
        assert_eq!(result.unwrap().rows_written, 0);
        assert!(as_text(&bytes).contains("No records match"));
    }
}
