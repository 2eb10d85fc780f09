//! Certificate rendering: a name drawn over a template image, rasterized and
//! collected into a PDF.

pub mod layout;
pub mod pdf;

use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use layout::{place, scaled_height};
use pdf::PageImage;

const JPEG_QUALITY: u8 = 90;
const LINE_HEIGHT: f32 = 1.2;
const MAX_TARGET_WIDTH: u32 = 6000;
/// Accepted `fontSize` range, in pixels at the reference width.
pub const MIN_FONT_SIZE: f32 = 4.0;
pub const MAX_FONT_SIZE: f32 = 400.0;
/// Accepted `referenceWidth` range, in pixels.
pub const MIN_REFERENCE_WIDTH: f32 = 50.0;
pub const MAX_REFERENCE_WIDTH: f32 = MAX_TARGET_WIDTH as f32;

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid color regex"));

/// The positioned name field of a certificate template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    /// Placeholder text shown in the editor.
    pub text: String,
    /// Horizontal anchor, percent of template width.
    pub x: f32,
    /// Vertical anchor, percent of template height.
    pub y: f32,
    pub font_size: f32,
    pub color: String,
    pub font_family: String,
    /// Width the font size was chosen at; template width if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_width: Option<f32>,
}

impl TextElement {
    /// Checks fields and clamps the anchor into [0,100].
    pub fn normalized(mut self) -> Result<Self> {
        if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&self.font_size) {
            return Err(AppError::BadRequest(format!(
                "Font size must be between {} and {}",
                MIN_FONT_SIZE, MAX_FONT_SIZE
            )));
        }
        if let Some(width) = self.reference_width {
            if !(MIN_REFERENCE_WIDTH..=MAX_REFERENCE_WIDTH).contains(&width) {
                return Err(AppError::BadRequest(format!(
                    "Reference width must be between {} and {}",
                    MIN_REFERENCE_WIDTH, MAX_REFERENCE_WIDTH
                )));
            }
        }
        parse_color(&self.color)?;
        self.x = layout::clamp_percent(self.x);
        self.y = layout::clamp_percent(self.y);
        Ok(self)
    }
}

pub fn parse_color(value: &str) -> Result<[u8; 3]> {
    let captures = HEX_COLOR
        .captures(value.trim())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid color '{}'", value)))?;
    let hex = &captures[1];
    let channel = |s: &str| u8::from_str_radix(s, 16).unwrap_or(0);
    Ok(if hex.len() == 3 {
        let expand = |i: usize| channel(&hex[i..i + 1]) * 17;
        [expand(0), expand(1), expand(2)]
    } else {
        [channel(&hex[0..2]), channel(&hex[2..4]), channel(&hex[4..6])]
    })
}

fn family(name: &str) -> Family<'_> {
    match name.trim().to_ascii_lowercase().as_str() {
        "serif" => Family::Serif,
        "sans-serif" | "sans" => Family::SansSerif,
        "monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        _ => Family::Name(name.trim()),
    }
}

struct FontState {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

/// Shapes and draws names onto template rasters. Shared across requests; the
/// font system sits behind a lock, so callers run it on a blocking thread.
pub struct CertificateRenderer {
    fonts: Mutex<FontState>,
}

impl CertificateRenderer {
    pub fn new(fonts_dir: Option<&Path>) -> Self {
        let mut font_system = FontSystem::new();
        if let Some(dir) = fonts_dir {
            font_system.db_mut().load_fonts_dir(dir);
            tracing::info!("Loaded certificate fonts from {}", dir.display());
        }
        Self {
            fonts: Mutex::new(FontState {
                font_system,
                swash_cache: SwashCache::new(),
            }),
        }
    }

    /// Decodes the template and scales it to `target_width` when given.
    pub fn load_template(&self, bytes: &[u8], target_width: Option<u32>) -> Result<RgbaImage> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| AppError::TemplateLoad(e.to_string()))?;
        let image = match target_width {
            Some(width) if width != decoded.width() => {
                let width = width.clamp(1, MAX_TARGET_WIDTH);
                let height = scaled_height(decoded.width(), decoded.height(), width);
                decoded.resize_exact(width, height, FilterType::Triangle)
            }
            _ => decoded,
        };
        Ok(image.to_rgba8())
    }

    /// Draws `name` onto a copy of `template`, centred on the element's anchor.
    pub fn draw_name(
        &self,
        template: &RgbaImage,
        natural_width: u32,
        element: &TextElement,
        name: &str,
    ) -> Result<RgbaImage> {
        let [r, g, b] = parse_color(&element.color)?;
        if name.trim().is_empty() {
            return Ok(template.clone());
        }
        let (width, height) = template.dimensions();
        let placement = place(element, width, height, natural_width);
        let mut canvas = template.clone();

        let mut guard = self
            .fonts
            .lock()
            .map_err(|_| AppError::Internal("Font system lock poisoned".to_string()))?;
        let FontState { font_system, swash_cache } = &mut *guard;

        let metrics = Metrics::new(placement.font_size, placement.font_size * LINE_HEIGHT);
        let mut buffer = Buffer::new(font_system, metrics);
        buffer.set_text(
            font_system,
            name,
            Attrs::new().family(family(&element.font_family)),
            Shaping::Advanced,
        );
        buffer.shape_until_scroll(font_system, false);

        let mut text_width: f32 = 0.0;
        let mut lines = 0usize;
        for run in buffer.layout_runs() {
            text_width = text_width.max(run.line_w);
            lines += 1;
        }
        let text_height = lines as f32 * metrics.line_height;
        let origin_x = (placement.x - text_width / 2.0).round() as i32;
        let origin_y = (placement.y - text_height / 2.0).round() as i32;

        buffer.draw(font_system, swash_cache, Color::rgb(r, g, b), |x, y, w, h, color| {
            for dy in 0..h as i32 {
                for dx in 0..w as i32 {
                    blend(&mut canvas, origin_x + x + dx, origin_y + y + dy, color);
                }
            }
        });

        tracing::debug!(
            "Drew '{}' at ({}, {}) size {:.1}px on {}x{}",
            name, origin_x, origin_y, placement.font_size, width, height
        );
        Ok(canvas)
    }

    /// Renders one certificate and returns it as PNG, for the editor preview.
    pub fn render_preview_png(
        &self,
        template: &[u8],
        element: &TextElement,
        name: &str,
        target_width: Option<u32>,
    ) -> Result<Vec<u8>> {
        let natural_width = image::load_from_memory(template)
            .map_err(|e| AppError::TemplateLoad(e.to_string()))?
            .width();
        let base = self.load_template(template, target_width)?;
        let rendered = self.draw_name(&base, natural_width, element, name)?;
        encode_png(rendered)
    }

    /// Renders one page per name, in order, into a single PDF.
    pub fn render_pdf(
        &self,
        title: &str,
        template: &[u8],
        element: &TextElement,
        names: &[String],
    ) -> Result<Vec<u8>> {
        let base = self.load_template(template, None)?;
        let natural_width = base.width();
        let pages = names
            .iter()
            .map(|name| {
                let rendered = self.draw_name(&base, natural_width, element, name)?;
                encode_jpeg(rendered)
            })
            .collect::<Result<Vec<PageImage>>>()?;
        tracing::info!("Assembled {} certificate page(s) for {}", pages.len(), title);
        Ok(pdf::assemble(title, &pages))
    }
}

fn blend(canvas: &mut RgbaImage, x: i32, y: i32, color: Color) {
    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
        return;
    }
    let alpha = color.a() as f32 / 255.0;
    if alpha <= 0.0 {
        return;
    }
    let Rgba([r, g, b, a]) = *canvas.get_pixel(x as u32, y as u32);
    let mix = |dst: u8, src: u8| (src as f32 * alpha + dst as f32 * (1.0 - alpha)).round() as u8;
    canvas.put_pixel(
        x as u32,
        y as u32,
        Rgba([mix(r, color.r()), mix(g, color.g()), mix(b, color.b()), a.max(color.a())]),
    );
}

fn encode_png(image: RgbaImage) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| AppError::Encoding(e.to_string()))?;
    Ok(out.into_inner())
}

fn encode_jpeg(image: RgbaImage) -> Result<PageImage> {
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| AppError::Encoding(e.to_string()))?;
    Ok(PageImage {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}
