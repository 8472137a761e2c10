//! Compliance header band drawn above the stitched surface
//!
//! Text is drawn with the 8x8 bitmap glyphs from `font8x8`, scaled by an
//! integer factor, so output is byte-identical across machines.

use crate::naming::CaptureMode;
use crate::{Error, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{imageops, Rgba, RgbaImage};
use log::debug;
use serde::{Deserialize, Serialize};

const GLYPH_SIZE: u32 = 8;
const BASE_GLYPH_SCALE: u32 = 2;
const BASE_LINE_HEIGHT: u32 = 22;
const BASE_PADDING: u32 = 12;
const BASE_SEPARATOR: u32 = 2;

const HEADER_BACKGROUND: Rgba<u8> = Rgba([245, 245, 245, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([96, 96, 96, 255]);
const VALUE_COLOR: Rgba<u8> = Rgba([17, 17, 17, 255]);
const SEPARATOR_COLOR: Rgba<u8> = Rgba([51, 51, 51, 255]);

/// Recognized metadata fields, in rendering order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    FlowOrSetName,
    StepOrIndex,
    PageName,
    LoginState,
    Version,
    Timestamp,
    UrlPath,
}

impl MetadataField {
    pub const ORDER: [MetadataField; 7] = [
        MetadataField::FlowOrSetName,
        MetadataField::StepOrIndex,
        MetadataField::PageName,
        MetadataField::LoginState,
        MetadataField::Version,
        MetadataField::Timestamp,
        MetadataField::UrlPath,
    ];

    fn label(self, mode_label: Option<&str>) -> &str {
        match self {
            MetadataField::FlowOrSetName => mode_label.unwrap_or("Flow"),
            MetadataField::StepOrIndex => mode_label
                .and_then(CaptureMode::from_label)
                .unwrap_or(CaptureMode::Flow)
                .index_label(),
            MetadataField::PageName => "Page",
            MetadataField::LoginState => "Login",
            MetadataField::Version => "Version",
            MetadataField::Timestamp => "Captured",
            MetadataField::UrlPath => "URL",
        }
    }
}

/// Snapshot of the values shown in the header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayMetadata {
    pub mode_label: Option<String>,
    pub flow_or_set_name: Option<String>,
    pub step_or_index: Option<String>,
    pub page_name: Option<String>,
    pub login_state: Option<String>,
    pub version: Option<String>,
    pub timestamp: Option<String>,
    pub url_path: Option<String>,
    pub pixel_scale_ratio: f64,
}

impl Default for OverlayMetadata {
    fn default() -> Self {
        Self {
            mode_label: None,
            flow_or_set_name: None,
            step_or_index: None,
            page_name: None,
            login_state: None,
            version: None,
            timestamp: None,
            url_path: None,
            pixel_scale_ratio: 1.0,
        }
    }
}

impl OverlayMetadata {
    /// Value of `field`, treating blank strings as absent
    pub fn value(&self, field: MetadataField) -> Option<&str> {
        let value = match field {
            MetadataField::FlowOrSetName => &self.flow_or_set_name,
            MetadataField::StepOrIndex => &self.step_or_index,
            MetadataField::PageName => &self.page_name,
            MetadataField::LoginState => &self.login_state,
            MetadataField::Version => &self.version,
            MetadataField::Timestamp => &self.timestamp,
            MetadataField::UrlPath => &self.url_path,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// Present fields in rendering order
    pub fn present_fields(&self) -> impl Iterator<Item = (MetadataField, &str)> + '_ {
        MetadataField::ORDER
            .into_iter()
            .filter_map(move |f| self.value(f).map(|v| (f, v)))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pixel_scale_ratio.is_finite() && self.pixel_scale_ratio > 0.0) {
            return Err(Error::Config(format!(
                "pixel_scale_ratio must be positive, got {}",
                self.pixel_scale_ratio
            )));
        }
        Ok(())
    }
}

/// One rendered header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    /// `"Label: "` on the first line of a field, `None` on continuations
    pub label: Option<String>,
    pub text: String,
    /// Column (in characters) where `text` starts
    pub indent: usize,
}

/// Header geometry in device pixels
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderLayout {
    pub lines: Vec<HeaderLine>,
    pub glyph_scale: u32,
    pub line_height: u32,
    pub padding: u32,
    pub separator: u32,
}

impl HeaderLayout {
    /// Lay out `metadata` for a surface `width` pixels wide
    pub fn compute(metadata: &OverlayMetadata, width: u32) -> Result<Self> {
        metadata.validate()?;
        let ratio = metadata.pixel_scale_ratio;
        let glyph_scale = scaled(BASE_GLYPH_SCALE, ratio);
        let padding = scaled(BASE_PADDING, ratio);
        let advance = GLYPH_SIZE * glyph_scale;
        let columns = (width.saturating_sub(2 * padding) / advance).max(1) as usize;

        let mode_label = metadata.mode_label.as_deref().filter(|l| !l.trim().is_empty());
        let mut lines = Vec::new();
        for (field, value) in metadata.present_fields() {
            let label = format!("{}: ", field.label(mode_label));
            wrap_field(&label, value, columns, &mut lines);
        }

        Ok(Self {
            lines,
            glyph_scale,
            line_height: scaled(BASE_LINE_HEIGHT, ratio).max(GLYPH_SIZE * glyph_scale),
            padding,
            separator: scaled(BASE_SEPARATOR, ratio),
        })
    }

    /// `lines * line_height + 2 * padding + separator`
    pub fn height(&self) -> u32 {
        self.lines.len() as u32 * self.line_height + 2 * self.padding + self.separator
    }
}

/// Character-granularity wrap: each line holds as many characters as fit,
/// continuation lines align under the first value column.
fn wrap_field(label: &str, value: &str, columns: usize, out: &mut Vec<HeaderLine>) {
    let indent = label.chars().count();
    let capacity = columns.saturating_sub(indent).max(1);
    let chars: Vec<char> = value.chars().collect();

    for (i, chunk) in chars.chunks(capacity).enumerate() {
        out.push(HeaderLine {
            label: (i == 0).then(|| label.to_string()),
            text: chunk.iter().collect(),
            indent,
        });
    }
}

fn scaled(base: u32, ratio: f64) -> u32 {
    (f64::from(base) * ratio).round().max(1.0) as u32
}

/// Grow `surface` by the header height and draw the header above the
/// original content.
pub fn apply_overlay(surface: &RgbaImage, metadata: &OverlayMetadata) -> Result<RgbaImage> {
    let layout = HeaderLayout::compute(metadata, surface.width())?;
    let header = layout.height();
    let height = surface
        .height()
        .checked_add(header)
        .ok_or_else(|| Error::Encoding("overlaid surface height overflows".into()))?;

    let mut out = RgbaImage::from_pixel(surface.width(), height, HEADER_BACKGROUND);
    imageops::replace(&mut out, surface, 0, i64::from(header));

    for y in header - layout.separator..header {
        for x in 0..out.width() {
            out.put_pixel(x, y, SEPARATOR_COLOR);
        }
    }

    let advance = GLYPH_SIZE * layout.glyph_scale;
    let glyph_height = GLYPH_SIZE * layout.glyph_scale;
    for (i, line) in layout.lines.iter().enumerate() {
        let top = layout.padding + i as u32 * layout.line_height + (layout.line_height - glyph_height) / 2;
        if let Some(label) = &line.label {
            draw_text(&mut out, layout.padding, top, label, layout.glyph_scale, LABEL_COLOR);
        }
        let x = layout.padding + line.indent as u32 * advance;
        draw_text(&mut out, x, top, &line.text, layout.glyph_scale, VALUE_COLOR);
    }

    debug!("overlay header {}px ({} lines) on {}px wide surface", header, layout.lines.len(), surface.width());
    Ok(out)
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Draw `text` with its top-left corner at `(x, y)`, clipped to the image
fn draw_text(img: &mut RgbaImage, x: u32, y: u32, text: &str, scale: u32, color: Rgba<u8>) {
    let advance = GLYPH_SIZE * scale;
    let (width, height) = img.dimensions();

    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as u32 * advance;
        if origin_x >= width {
            break;
        }
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = y + row as u32 * scale;
                for sy in 0..scale {
                    for sx in 0..scale {
                        let (tx, ty) = (px + sx, py + sy);
                        if tx < width && ty < height {
                            img.put_pixel(tx, ty, color);
                        }
                    }
                }
            }
        }
    }
}
