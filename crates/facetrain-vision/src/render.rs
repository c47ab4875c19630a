//! PNG rendering of the training-set projection and of annotated frames.

use ab_glyph::FontRef;
use base64::Engine;
use facetrain_core::balancer::TrainingSet;
use facetrain_core::{FaceAnnotation, Frame, Label, PersonRegistry, RenderError, Renderer};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use ndarray::{Array1, Array2, Axis};
use std::io::Cursor;

const CANVAS_SIZE: u32 = 480;
const MARGIN: f64 = 24.0;
const POINT_RADIUS: i32 = 4;
const POWER_ITERATIONS: usize = 64;

const FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");
const TEXT_SCALE: f32 = 14.0;
const LEGEND_ROW: i32 = 16;
const LEGEND_SWATCH: u32 = 10;
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const UNKNOWN_COLOR: Rgb<u8> = Rgb([150, 150, 150]);
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([188, 189, 34]),
];

fn label_color(label: Label) -> Rgb<u8> {
    match label.index() {
        Some(i) => PALETTE[i % PALETTE.len()],
        None => UNKNOWN_COLOR,
    }
}

fn font() -> Result<FontRef<'static>, RenderError> {
    FontRef::try_from_slice(FONT_BYTES).map_err(|e| RenderError::Encode(format!("font: {e}")))
}

/// Renders diagnostics as base64 PNG `data:` URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngRenderer;

impl Renderer for PngRenderer {
    fn scatter(&self, set: &TrainingSet<'_>, people: &PersonRegistry) -> Result<String, RenderError> {
        if set.is_empty() {
            return Err(RenderError::Empty);
        }
        let dim = set.rows[0].dim();
        let data: Vec<f64> = set
            .rows
            .iter()
            .flat_map(|e| e.values().iter().map(|&v| f64::from(v)))
            .collect();
        let records =
            Array2::from_shape_vec((set.len(), dim), data).map_err(|e| RenderError::Encode(e.to_string()))?;

        let points = project_2d(&records);
        let mut img = RgbImage::from_pixel(CANVAS_SIZE, CANVAS_SIZE, Rgb([255, 255, 255]));
        for ((x, y), &label) in fit_to_canvas(&points).into_iter().zip(&set.labels) {
            draw_filled_circle_mut(&mut img, (x, y), POINT_RADIUS, label_color(label));
        }

        // Legend: one named swatch per person in registry order, then unknown.
        let font = font()?;
        let mut legend: Vec<Label> = (0..people.len()).map(Label::person).collect();
        if set.labels.iter().any(|l| l.is_unknown()) {
            legend.push(Label::UNKNOWN);
        }
        let rows = (CANVAS_SIZE as i32 - 8) / LEGEND_ROW;
        for (row, label) in legend.into_iter().take(rows as usize).enumerate() {
            let y = 4 + LEGEND_ROW * row as i32;
            let swatch = Rect::at(4, y).of_size(LEGEND_SWATCH, LEGEND_SWATCH);
            draw_filled_rect_mut(&mut img, swatch, label_color(label));
            draw_text_mut(&mut img, TEXT_COLOR, 18, y - 2, TEXT_SCALE, &font, people.display_name(label));
        }

        tracing::debug!(points = set.len(), people = people.len(), "rendered projection");
        encode_png(DynamicImage::ImageRgb8(img))
    }

    fn annotate(
        &self,
        frame: &Frame,
        faces: &[FaceAnnotation],
        people: &PersonRegistry,
    ) -> Result<String, RenderError> {
        let gray = frame.to_image().ok_or(RenderError::Empty)?;
        if gray.width() == 0 || gray.height() == 0 {
            return Err(RenderError::Empty);
        }
        let mut img = DynamicImage::ImageLuma8(gray).to_rgb8();
        let font = font()?;
        let text_height = TEXT_SCALE.ceil() as i32;

        for face in faces {
            let b = &face.bbox;
            if b.width <= 0.0 || b.height <= 0.0 {
                continue;
            }
            let x1 = b.x.max(0.0) as i32;
            let y1 = b.y.max(0.0) as i32;
            let x2 = (b.x + b.width).min(img.width() as f32) as i32;
            let y2 = (b.y + b.height).min(img.height() as f32) as i32;
            let w = (x2 - x1).max(1) as u32;
            let h = (y2 - y1).max(1) as u32;

            let color = label_color(face.label);
            draw_hollow_rect_mut(&mut img, Rect::at(x1, y1).of_size(w, h), color);
            if w > 2 && h > 2 {
                draw_hollow_rect_mut(&mut img, Rect::at(x1 + 1, y1 + 1).of_size(w - 2, h - 2), color);
            }

            // Name above the box, or below it when the box touches the top edge.
            let name = people.display_name(face.label);
            let text_y = if y1 >= text_height + 2 {
                y1 - text_height - 2
            } else {
                y2 + 2
            };
            draw_text_mut(&mut img, color, x1, text_y, TEXT_SCALE, &font, name);
            tracing::trace!(label = %face.label, name, "outlined face");
        }

        encode_png(DynamicImage::ImageRgb8(img))
    }
}

fn encode_png(img: DynamicImage) -> Result<String, RenderError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
    Ok(format!("data:image/png;base64,{b64}"))
}

/// Project rows onto their two leading principal components.
fn project_2d(records: &Array2<f64>) -> Vec<(f64, f64)> {
    let Some(mean) = records.mean_axis(Axis(0)) else {
        return Vec::new();
    };
    let centered = records - &mean;

    let first = leading_component(&centered, None);
    let second = leading_component(&centered, Some(&first));
    let xs = centered.dot(&first);
    let ys = centered.dot(&second);
    xs.iter().copied().zip(ys.iter().copied()).collect()
}

/// Power iteration on `XᵀX`, kept orthogonal to `exclude` if given.
fn leading_component(x: &Array2<f64>, exclude: Option<&Array1<f64>>) -> Array1<f64> {
    let dim = x.ncols();
    // Deterministic, non-degenerate start.
    let mut v = Array1::from_iter((0..dim).map(|i| 1.0 + (i % 7) as f64 * 0.1));

    for _ in 0..POWER_ITERATIONS {
        if let Some(u) = exclude {
            v = &v - &(u * u.dot(&v));
        }
        let norm = v.dot(&v).sqrt();
        if !(norm > 1e-12) {
            return Array1::zeros(dim);
        }
        v /= norm;
        v = x.t().dot(&x.dot(&v));
    }
    if let Some(u) = exclude {
        v = &v - &(u * u.dot(&v));
    }
    let norm = v.dot(&v).sqrt();
    if norm > 1e-12 {
        v / norm
    } else {
        Array1::zeros(dim)
    }
}

/// Scale points into the canvas, keeping the aspect ratio.
fn fit_to_canvas(points: &[(f64, f64)]) -> Vec<(i32, i32)> {
    let (min_x, max_x) = bounds(points.iter().map(|p| p.0));
    let (min_y, max_y) = bounds(points.iter().map(|p| p.1));
    let span = (max_x - min_x).max(max_y - min_y);
    let usable = f64::from(CANVAS_SIZE) - 2.0 * MARGIN;
    let scale = if span > 1e-12 { usable / span } else { 0.0 };
    let center = f64::from(CANVAS_SIZE) / 2.0;
    let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    points
        .iter()
        .map(|&(x, y)| {
            (
                (center + (x - mid_x) * scale).round() as i32,
                (center - (y - mid_y) * scale).round() as i32,
            )
        })
        .collect()
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
