//! Text watermark drawn with an 8x8 bitmap font.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use serde::{Deserialize, Serialize};

use super::{check_range, StageContext, TransformStage, WorkingImage};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::raster::{parse_hex_color, RasterBuffer};

const STAGE: &str = "watermark";
const GLYPH: u32 = 8;

/// Where the text block sits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub text: String,
    #[serde(default)]
    pub position: Anchor,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Text height in pixels; `[watermark] font_size` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    /// `#rrggbb` or `#rrggbbaa`; `[watermark] color` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<u32>,
}

fn default_opacity() -> f32 {
    0.5
}

impl WatermarkSpec {
    pub fn new(text: impl Into<String>, position: Anchor) -> Self {
        Self {
            text: text.into(),
            position,
            opacity: default_opacity(),
            font_size: None,
            color: None,
            padding: None,
        }
    }
}

/// Integer glyph scale for a requested text height.
fn glyph_scale(font_size: u32) -> u32 {
    ((f64::from(font_size) / f64::from(GLYPH)).round() as u32).max(1)
}

/// Width and height of `text` rendered at `font_size`.
pub fn measure_text(text: &str, font_size: u32) -> (u32, u32) {
    let glyph_px = GLYPH.saturating_mul(glyph_scale(font_size));
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    (chars.saturating_mul(glyph_px), glyph_px)
}

/// Left edge and baseline of a `text` block of `text_size` inside `canvas`.
pub fn anchor_origin(
    anchor: Anchor,
    canvas: (u32, u32),
    text_size: (u32, u32),
    padding: u32,
) -> (i64, i64) {
    let (w, h) = (i64::from(canvas.0), i64::from(canvas.1));
    let (tw, th) = (i64::from(text_size.0), i64::from(text_size.1));
    let p = i64::from(padding);
    match anchor {
        Anchor::TopLeft => (p, p + th),
        Anchor::TopRight => (w - tw - p, p + th),
        Anchor::BottomLeft => (p, h - p),
        Anchor::BottomRight => (w - tw - p, h - p),
        Anchor::Center => ((w - tw) / 2, (h + th) / 2),
    }
}

fn glyph_for(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn draw_text(
    buffer: &mut RasterBuffer,
    text: &str,
    origin: (i64, i64),
    scale: u32,
    color: [u8; 4],
) {
    let (width, height) = buffer.dimensions();
    let (width, height) = (i64::from(width), i64::from(height));
    let scale = i64::from(scale);
    let glyph_px = i64::from(GLYPH) * scale;
    let top = origin.1 - glyph_px;

    for (i, c) in text.chars().enumerate() {
        let left = origin.0 + i as i64 * glyph_px;
        if left >= width {
            break;
        }
        if left + glyph_px <= 0 {
            continue;
        }
        for (row, bits) in glyph_for(c).iter().enumerate() {
            for col in 0..GLYPH {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                // Only the part of each scaled dot that lands on the canvas
                let x0 = left + i64::from(col) * scale;
                let y0 = top + row as i64 * scale;
                for y in y0.max(0)..(y0 + scale).min(height) {
                    for x in x0.max(0)..(x0 + scale).min(width) {
                        buffer.blend_pixel(x, y, color);
                    }
                }
            }
        }
    }
}

impl TransformStage for WatermarkSpec {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn validate(&self, ctx: &StageContext) -> PipelineResult<()> {
        if self.text.trim().is_empty() {
            return Err(PipelineError::invalid(STAGE, "text must not be empty"));
        }
        check_range(STAGE, "opacity", f64::from(self.opacity), 0.0, 1.0)?;
        let font_size = self.font_size.unwrap_or(ctx.watermark_font_size);
        if font_size == 0 {
            return Err(PipelineError::invalid(STAGE, "font_size must be > 0"));
        }
        if font_size > ctx.max_dimension {
            return Err(PipelineError::invalid(
                STAGE,
                format!(
                    "font_size {font_size} exceeds the {} pixel limit",
                    ctx.max_dimension
                ),
            ));
        }
        if let Some(color) = &self.color {
            if parse_hex_color(color).is_none() {
                return Err(PipelineError::invalid(
                    STAGE,
                    format!("color {color:?} is not #rrggbb or #rrggbbaa"),
                ));
            }
        }
        Ok(())
    }

    fn apply(&self, mut image: WorkingImage, ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let font_size = self.font_size.unwrap_or(ctx.watermark_font_size);
        let padding = self.padding.unwrap_or(ctx.watermark_padding);
        let mut color = self
            .color
            .as_deref()
            .and_then(parse_hex_color)
            .unwrap_or(ctx.watermark_color);
        color[3] = (f32::from(color[3]) * self.opacity).round() as u8;

        let text_size = measure_text(&self.text, font_size);
        let origin = anchor_origin(self.position, image.buffer.dimensions(), text_size, padding);
        tracing::trace!(
            "Watermark {:?} at ({}, {}) size {}x{}",
            self.text,
            origin.0,
            origin.1,
            text_size.0,
            text_size.1
        );
        draw_text(
            &mut image.buffer,
            &self.text,
            origin,
            glyph_scale(font_size),
            color,
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn measures_scaled_glyphs() {
        assert_eq!(measure_text("abc", 8), (24, 8));
        assert_eq!(measure_text("abc", 32), (96, 32));
        assert_eq!(measure_text("", 32), (0, 32));
        // Tiny sizes still draw at scale 1
        assert_eq!(measure_text("a", 2), (8, 8));
    }

    #[test]
    fn bottom_right_origin() {
        let (tw, th) = measure_text("(c) imgpipe", 32);
        assert_eq!(
            anchor_origin(Anchor::BottomRight, (800, 600), (tw, th), 20),
            (800 - i64::from(tw) - 20, 580)
        );
    }

    #[test]
    fn other_anchors() {
        let size = (100, 20);
        assert_eq!(anchor_origin(Anchor::TopLeft, (800, 600), size, 20), (20, 40));
        assert_eq!(anchor_origin(Anchor::TopRight, (800, 600), size, 20), (680, 40));
        assert_eq!(anchor_origin(Anchor::BottomLeft, (800, 600), size, 20), (20, 580));
        assert_eq!(anchor_origin(Anchor::Center, (800, 600), size, 20), (350, 310));
    }

    #[test]
    fn draws_only_inside_text_block() {
        let canvas = RasterBuffer::filled(200, 100, [0, 0, 0, 255]).unwrap();
        let mut spec = WatermarkSpec::new("HI", Anchor::TopLeft);
        spec.opacity = 1.0;
        spec.font_size = Some(16);
        spec.padding = Some(10);
        spec.color = Some("#ff0000".to_string());

        let out = spec
            .apply(working(canvas), &StageContext::default())
            .unwrap()
            .buffer;

        let mut touched = 0;
        for y in 0..100 {
            for x in 0..200 {
                let p = out.pixel(x, y);
                if p != [0, 0, 0, 255] {
                    touched += 1;
                    assert!((10..42).contains(&x) && (10..26).contains(&y), "({x}, {y})");
                    assert_eq!(p, [255, 0, 0, 255]);
                }
            }
        }
        assert!(touched > 0);
    }

    #[test]
    fn opacity_blends_with_background() {
        let canvas = RasterBuffer::filled(64, 32, [0, 0, 0, 255]).unwrap();
        let mut spec = WatermarkSpec::new("#", Anchor::Center);
        spec.opacity = 0.5;
        spec.color = Some("#ffffff".to_string());
        spec.font_size = Some(8);

        let out = spec
            .apply(working(canvas), &StageContext::default())
            .unwrap()
            .buffer;
        let blended = out.pixels().chunks_exact(4).find(|p| p[0] != 0).unwrap();
        assert!((126..=129).contains(&blended[0]), "{blended:?}");
        assert_eq!(blended[3], 255);
    }

    #[test]
    fn validation() {
        let ctx = StageContext::default();
        assert!(WatermarkSpec::new("  ", Anchor::Center).validate(&ctx).is_err());

        let mut spec = WatermarkSpec::new("x", Anchor::Center);
        spec.opacity = 1.5;
        assert!(spec.validate(&ctx).is_err());

        let mut spec = WatermarkSpec::new("x", Anchor::Center);
        spec.color = Some("red".to_string());
        assert!(spec.validate(&ctx).is_err());
    }

    #[test]
    fn text_off_canvas_is_clipped() {
        let canvas = RasterBuffer::filled(10, 10, [0, 0, 0, 255]).unwrap();
        let spec = WatermarkSpec::new("a long watermark", Anchor::BottomRight);
        let out = spec.apply(working(canvas), &StageContext::default()).unwrap();
        assert_eq!(out.buffer.dimensions(), (10, 10));
    }

    #[test]
    fn huge_font_size_is_rejected() {
        let ctx = StageContext::default();
        let mut spec = WatermarkSpec::new("abc", Anchor::Center);
        spec.font_size = Some(2_000_000_000);
        assert!(matches!(
            spec.validate(&ctx),
            Err(PipelineError::InvalidParameter { .. })
        ));

        spec.font_size = Some(ctx.max_dimension);
        assert!(spec.validate(&ctx).is_ok());
    }

    #[test]
    fn measure_text_saturates() {
        assert_eq!(measure_text("abc", u32::MAX), (u32::MAX, u32::MAX));
    }

    #[test]
    fn large_glyphs_only_touch_the_canvas() {
        let ctx = StageContext::default();
        let canvas = RasterBuffer::filled(40, 30, [0, 0, 0, 255]).unwrap();
        let mut spec = WatermarkSpec::new("#", Anchor::TopLeft);
        spec.opacity = 1.0;
        spec.padding = Some(0);
        spec.font_size = Some(ctx.max_dimension);

        let out = spec.apply(working(canvas), &ctx).unwrap();
        assert_eq!(out.buffer.dimensions(), (40, 30));
    }
}
