//! Printable PDF report for a stored dataset.
//!
//! [`ReportLayout`] is a pure projection of a [`DatasetRecord`] into positioned
//! text lines; [`render_pdf`] draws that layout with `printpdf`. The summary is
//! never recomputed here.

use anyhow::{Result, anyhow};
use printpdf::{BuiltinFont, Mm, PdfDocument, Pt};

use crate::store::DatasetRecord;

// US Letter, in points.
const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;

const FONT_SIZE: f32 = 12.0;
const TOP_Y: f32 = 760.0;
const BOTTOM_MARGIN: f32 = 50.0;
const HEADING_X: f32 = 50.0;
const ENTRY_X: f32 = 70.0;
const LINE_STEP: f32 = 15.0;

/// A single text line placed on a page. Coordinates are in points from the bottom-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub page: usize,
    pub x: f32,
    pub y: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    lines: Vec<ReportLine>,
    pages: usize,
}

struct Cursor {
    page: usize,
    y: f32,
    lines: Vec<ReportLine>,
}

impl Cursor {
    fn new() -> Self {
        Self {
            page: 0,
            y: TOP_Y,
            lines: Vec::new(),
        }
    }

    fn write(&mut self, x: f32, text: impl Into<String>) {
        if self.y < BOTTOM_MARGIN {
            self.page += 1;
            self.y = TOP_Y;
        }
        self.lines.push(ReportLine {
            page: self.page,
            x,
            y: self.y,
            text: text.into(),
        });
    }

    fn down(&mut self, dy: f32) {
        self.y -= dy;
    }
}

impl ReportLayout {
    pub fn from_record(record: &DatasetRecord) -> Self {
        let summary = &record.summary;
        let mut c = Cursor::new();

        c.write(HEADING_X, format!("Report: {}", record.name));
        c.down(LINE_STEP);
        c.write(HEADING_X, format!("Uploaded: {}", record.uploaded_at.to_rfc3339()));
        c.down(25.0);
        c.write(HEADING_X, format!("Total items: {}", summary.total_count));
        c.down(20.0);

        c.write(HEADING_X, "Averages:");
        c.down(LINE_STEP);
        for (column, value) in &summary.averages {
            let text = match value {
                Some(v) => format!("{column}: {v:.3}"),
                None => format!("{column}: n/a"),
            };
            c.write(ENTRY_X, text);
            c.down(LINE_STEP);
        }

        c.down(10.0);
        c.write(HEADING_X, "Type distribution:");
        c.down(LINE_STEP);
        for (kind, count) in summary.distribution_by_count() {
            c.write(ENTRY_X, format!("{kind}: {count}"));
            c.down(LINE_STEP);
        }

        let pages = c.page + 1;
        ReportLayout {
            lines: c.lines,
            pages,
        }
    }

    pub fn lines(&self) -> &[ReportLine] {
        &self.lines
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.text.as_str())
    }
}

/// Attachment file name offered for a dataset's report.
///
/// Path separators and quotes in the display name become `_`, so the result is
/// always a single file name.
pub fn attachment_filename(name: &str) -> String {
    format!("{}_report.pdf", name.replace(['/', '\\', '"'], "_"))
}

/// Renders the report for `record` as PDF bytes.
///
/// # Errors
///
/// Returns an error if the built-in font cannot be registered or the document
/// fails to serialize.
pub fn render_pdf(record: &DatasetRecord) -> Result<Vec<u8>> {
    let layout = ReportLayout::from_record(record);
    let width = Mm::from(Pt(PAGE_WIDTH_PT));
    let height = Mm::from(Pt(PAGE_HEIGHT_PT));

    let (doc, first_page, first_layer) =
        PdfDocument::new(format!("Report: {}", record.name), width, height, "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("failed to load Helvetica: {e}"))?;

    let mut layers = vec![doc.get_page(first_page).get_layer(first_layer)];
    for _ in 1..layout.page_count() {
        let (page, layer) = doc.add_page(width, height, "Layer 1");
        layers.push(doc.get_page(page).get_layer(layer));
    }

    for line in layout.lines() {
        layers[line.page].use_text(
            line.text.clone(),
            FONT_SIZE,
            Mm::from(Pt(line.x)),
            Mm::from(Pt(line.y)),
            &font,
        );
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("failed to serialize PDF report: {e}"))
}
