//! Downloadable valuation report.
//!
//! [`layout_report`] decides *what* goes on the page, in a fixed order;
//! a [`DocumentRenderer`] decides how the blocks become bytes.

use image::codecs::png::PngDecoder;
use printpdf::{
    image_crate::codecs::png::PngDecoder as PdfPngDecoder, BuiltinFont, Image, ImageTransform,
    IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use std::io::Cursor;

use crate::error::PipelineError;
use crate::narrative::Narrative;
use crate::types::{FeatureRecord, PredictionResult};

pub const REPORT_TITLE: &str = "Car Price Prediction Report";
pub const REPORT_FILENAME: &str = "car_price_report.pdf";

/// Chart size on the page, in points.
const CHART_WIDTH_PT: f32 = 400.0;
const CHART_HEIGHT_PT: f32 = 250.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    /// Optional bold label followed by body text.
    Paragraph { label: Option<String>, body: String },
    Spacer(f32),
    Image { png: Vec<u8>, width_pt: f32, height_pt: f32 },
}

impl Block {
    fn field(label: impl Into<String>, body: impl Into<String>) -> Self {
        Block::Paragraph {
            label: Some(label.into()),
            body: body.into(),
        }
    }

    /// Text carried by this block, images excluded.
    pub fn text(&self) -> Option<String> {
        match self {
            Block::Title(t) => Some(t.clone()),
            Block::Paragraph { label: Some(l), body } => Some(format!("{}: {}", l, body)),
            Block::Paragraph { label: None, body } => Some(body.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width_mm: 210.0,
        height_mm: 297.0,
    };
}

pub trait DocumentRenderer {
    fn render(&self, blocks: &[Block], page: PageSize) -> Result<Vec<u8>, PipelineError>;
}

/// The chart must be a decodable PNG; it is never silently dropped.
fn check_chart(png: &[u8]) -> Result<(), PipelineError> {
    if png.is_empty() {
        return Err(PipelineError::Report("chart image is missing".to_string()));
    }
    PngDecoder::new(Cursor::new(png))
        .map(|_| ())
        .map_err(|e| PipelineError::Report(format!("chart image is corrupt: {}", e)))
}

pub fn layout_report(
    record: &FeatureRecord,
    predicted: &PredictionResult,
    narrative: &Narrative,
    chart_png: &[u8],
) -> Result<Vec<Block>, PipelineError> {
    check_chart(chart_png)?;

    let mut blocks = vec![Block::Title(REPORT_TITLE.to_string()), Block::Spacer(12.0)];
    for (label, value) in record.fields() {
        blocks.push(Block::field(label, value));
    }
    blocks.push(Block::Spacer(12.0));
    blocks.push(Block::field("Predicted Price", format!("Rs. {} Lakhs", predicted)));
    blocks.push(Block::Spacer(12.0));
    blocks.push(Block::Image {
        png: chart_png.to_vec(),
        width_pt: CHART_WIDTH_PT,
        height_pt: CHART_HEIGHT_PT,
    });
    blocks.push(Block::Spacer(12.0));
    let explanation = match narrative {
        Narrative::Available(text) => text.clone(),
        Narrative::Unavailable(_) => "AI explanation unavailable".to_string(),
    };
    blocks.push(Block::field("AI Explanation", ""));
    for line in explanation.lines() {
        blocks.push(Block::Paragraph {
            label: None,
            body: line.to_string(),
        });
    }
    Ok(blocks)
}

pub fn build_report_with(
    renderer: &dyn DocumentRenderer,
    record: &FeatureRecord,
    predicted: &PredictionResult,
    narrative: &Narrative,
    chart_png: &[u8],
) -> Result<Vec<u8>, PipelineError> {
    let blocks = layout_report(record, predicted, narrative, chart_png)?;
    let bytes = renderer.render(&blocks, PageSize::A4)?;
    tracing::info!(bytes = bytes.len(), blocks = blocks.len(), "assembled report");
    Ok(bytes)
}

/// A4 PDF report.
pub fn build_report(
    record: &FeatureRecord,
    predicted: &PredictionResult,
    narrative: &Narrative,
    chart_png: &[u8],
) -> Result<Vec<u8>, PipelineError> {
    build_report_with(&PdfRenderer::default(), record, predicted, narrative, chart_png)
}

// ---------- PDF ----------

const PT_TO_MM: f32 = 25.4 / 72.0;

fn report_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Report(e.to_string())
}

/// Built-in fonts only cover Latin-1.
fn latin1(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            '\u{20b9}' => 'R',
            c if (c as u32) < 0x100 => c,
            _ => '?',
        })
        .collect()
}

/// Greedy word wrap by character count.
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

pub struct PdfRenderer {
    pub margin_mm: f32,
    pub title_size: f32,
    pub body_size: f32,
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self {
            margin_mm: 20.0,
            title_size: 18.0,
            body_size: 11.0,
        }
    }
}

/// Cursor over the pages of a document being written top to bottom.
struct PdfCursor {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    page: PageSize,
    margin: f32,
    y: f32,
}

impl PdfCursor {
    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(self.page.width_mm), Mm(self.page.height_mm), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = self.page.height_mm - self.margin;
    }

    /// Move down by `h` mm, breaking the page first if it does not fit.
    fn advance(&mut self, h: f32) -> f32 {
        if self.y - h < self.margin {
            self.new_page();
        }
        self.y -= h;
        self.y
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(&self, blocks: &[Block], page: PageSize) -> Result<Vec<u8>, PipelineError> {
        let (doc, page1, layer1) = PdfDocument::new(
            REPORT_TITLE,
            Mm(page.width_mm),
            Mm(page.height_mm),
            "Layer 1",
        );
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(report_err)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(report_err)?;
        let layer = doc.get_page(page1).get_layer(layer1);

        let mut cur = PdfCursor {
            doc,
            layer,
            page,
            margin: self.margin_mm,
            y: page.height_mm - self.margin_mm,
        };
        let left = self.margin_mm;
        let usable_pt = (page.width_mm - 2.0 * self.margin_mm) / PT_TO_MM;
        // Helvetica averages roughly half an em per character.
        let chars_per_line = |size: f32| ((usable_pt / (size * 0.5)) as usize).max(10);

        for block in blocks {
            match block {
                Block::Title(t) => {
                    let line_h = self.title_size * 1.3 * PT_TO_MM;
                    for line in wrap(&latin1(t), chars_per_line(self.title_size)) {
                        let y = cur.advance(line_h);
                        cur.layer.use_text(line, self.title_size, Mm(left), Mm(y), &bold);
                    }
                }
                Block::Paragraph { label, body } => {
                    self.paragraph(&mut cur, label.as_deref(), body, &regular, &bold, chars_per_line(self.body_size));
                }
                Block::Spacer(pt) => {
                    cur.advance(pt * PT_TO_MM);
                }
                Block::Image { png, width_pt, height_pt } => {
                    let decoder = PdfPngDecoder::new(Cursor::new(png.as_slice()))
                        .map_err(|e| PipelineError::Report(format!("chart image is corrupt: {}", e)))?;
                    let image = Image::try_from(decoder)
                        .map_err(|e| PipelineError::Report(format!("chart image is corrupt: {}", e)))?;
                    let px_w = image.image.width.0 as f32;
                    let px_h = image.image.height.0 as f32;
                    // Fit inside width_pt x height_pt keeping the aspect ratio.
                    let dpi = (px_w * 72.0 / width_pt).max(px_h * 72.0 / height_pt);
                    let y = cur.advance(px_h * 72.0 / dpi * PT_TO_MM);
                    image.add_to_layer(
                        cur.layer.clone(),
                        ImageTransform {
                            translate_x: Some(Mm(left)),
                            translate_y: Some(Mm(y)),
                            dpi: Some(dpi),
                            ..Default::default()
                        },
                    );
                }
            }
        }

        cur.doc.save_to_bytes().map_err(report_err)
    }
}

impl PdfRenderer {
    fn paragraph(
        &self,
        cur: &mut PdfCursor,
        label: Option<&str>,
        body: &str,
        regular: &IndirectFontRef,
        bold: &IndirectFontRef,
        max_chars: usize,
    ) {
        let line_h = self.body_size * 1.4 * PT_TO_MM;
        let left = self.margin_mm;
        let body = latin1(body);
        match label {
            Some(label) => {
                let label = format!("{}:", latin1(label));
                let y = cur.advance(line_h);
                cur.layer.use_text(label.clone(), self.body_size, Mm(left), Mm(y), bold);
                if body.is_empty() {
                    return;
                }
                // Bold glyphs run a little wider than regular ones.
                let indent = (label.len() as f32 + 1.0) * self.body_size * 0.56 * PT_TO_MM;
                let first_max = max_chars.saturating_sub(label.len() + 1).max(10);
                let mut lines = wrap(&body, first_max).into_iter();
                if let Some(first) = lines.next() {
                    cur.layer.use_text(first, self.body_size, Mm(left + indent), Mm(y), regular);
                }
                let rest: Vec<String> = lines.collect();
                for line in wrap(&rest.join(" "), max_chars).into_iter().filter(|l| !l.is_empty()) {
                    let y = cur.advance(line_h);
                    cur.layer.use_text(line, self.body_size, Mm(left), Mm(y), regular);
                }
            }
            None => {
                for line in wrap(&body, max_chars) {
                    let y = cur.advance(line_h);
                    cur.layer.use_text(line, self.body_size, Mm(left), Mm(y), regular);
                }
            }
        }
    }
}
