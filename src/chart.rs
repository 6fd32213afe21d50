//! Depreciation chart: forecast line with point markers, a grid and tick
//! labels on both axes, as PNG.

use image::{codecs::png::PngEncoder, ColorType, ImageEncoder};
use once_cell::sync::OnceCell;
use plotters::prelude::*;
use plotters::style::register_font;

use crate::error::PipelineError;
use crate::types::ForecastSeries;

pub const DEFAULT_WIDTH: u32 = 500;
pub const DEFAULT_HEIGHT: u32 = 300;
pub const MIN_SIDE: u32 = 50;
pub const MAX_SIDE: u32 = 4000;

const GRID: RGBColor = RGBColor(220, 220, 220);
const LINE: RGBColor = RGBColor(31, 119, 180);
const H_GRID_LINES: usize = 5;
const LABEL_FONT: &str = "sans-serif";

static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
static FONT: OnceCell<()> = OnceCell::new();

fn render_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Chart(e.to_string())
}

/// plotters' glyph backend has no fonts of its own; register the bundled one.
fn ensure_font() -> Result<(), PipelineError> {
    FONT.get_or_try_init(|| {
        register_font(LABEL_FONT, FontStyle::Normal, FONT_BYTES)
            .map_err(|_| PipelineError::Chart("bundled label font is unreadable".to_string()))
    })
    .map(|_| ())
}

/// Y axis bounds with some headroom; flat series get a unit band.
fn price_range(prices: &[f64]) -> (f64, f64) {
    let lo = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pad = if hi - lo < 1e-9 { 1.0 } else { (hi - lo) * 0.1 };
    (lo - pad, hi + pad)
}

/// RGB buffer length for a `width` x `height` canvas within the size bounds.
fn buffer_len(width: u32, height: u32) -> Result<usize, PipelineError> {
    let in_bounds = |side: u32| (MIN_SIDE..=MAX_SIDE).contains(&side);
    if !in_bounds(width) || !in_bounds(height) {
        return Err(PipelineError::Chart(format!(
            "{}x{} is outside {}..={} pixels per side",
            width, height, MIN_SIDE, MAX_SIDE
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| PipelineError::Chart(format!("{}x{} overflows the pixel buffer", width, height)))
}

pub fn render_chart(series: &ForecastSeries, width: u32, height: u32) -> Result<Vec<u8>, PipelineError> {
    let len = buffer_len(width, height)?;
    ensure_font()?;

    let pairs: Vec<(f64, f64)> = series
        .points()
        .iter()
        .map(|p| (p.year as f64, p.price))
        .collect();
    let x0 = series.start_year() as f64 - 0.5;
    let x1 = x0 + pairs.len() as f64;
    let (y0, y1) = price_range(&series.prices());

    let mut rgb = vec![0u8; len];
    {
        let root = BitMapBackend::with_buffer(&mut rgb, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(12)
            .x_label_area_size(24)
            .y_label_area_size(40)
            .build_cartesian_2d(x0..x1, y0..y1)
            .map_err(render_err)?;

        let year_label = |x: &f64| format!("{:.0}", x);
        let price_label = |y: &f64| format!("{:.2}", y);
        chart
            .configure_mesh()
            .x_labels(pairs.len())
            .y_labels(H_GRID_LINES + 1)
            .x_label_formatter(&year_label)
            .y_label_formatter(&price_label)
            .bold_line_style(GRID)
            .light_line_style(TRANSPARENT)
            .label_style((LABEL_FONT, 12))
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(LineSeries::new(pairs.clone(), LINE.stroke_width(2)))
            .map_err(render_err)?;
        chart
            .draw_series(pairs.iter().map(|&p| Circle::new(p, 4, LINE.filled())))
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&rgb, width, height, ColorType::Rgb8)
        .map_err(render_err)?;
    tracing::debug!(bytes = png.len(), width, height, "rendered depreciation chart");
    Ok(png)
}
