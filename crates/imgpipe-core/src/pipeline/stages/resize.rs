//! Resize to explicit pixels, a percentage, or a named preset.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::{check_range, StageContext, TransformStage, WorkingImage};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::raster::RasterBuffer;

const STAGE: &str = "resize";

/// Named target sizes.
pub const PRESETS: &[(&str, u32, u32)] = &[
    ("thumbnail", 150, 150),
    ("hd", 1280, 720),
    ("full-hd", 1920, 1080),
    ("instagram-square", 1080, 1080),
    ("instagram-portrait", 1080, 1350),
    ("facebook-cover", 820, 312),
    ("twitter-post", 1200, 675),
    ("youtube-thumbnail", 1280, 720),
];

/// Resampling filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Resize parameters. Exactly one sizing source must be set: `width` and/or
/// `height`, `percent`, or `preset`.
///
/// With `maintain_aspect`, the height follows the width (width wins when both
/// are given); with only a height, the width follows the height. Derived
/// dimensions are rounded to the nearest integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default = "default_maintain_aspect")]
    pub maintain_aspect: bool,
    #[serde(default)]
    pub filter: ResizeFilter,
}

fn default_maintain_aspect() -> bool {
    true
}

impl ResizeSpec {
    /// Scale both sides by `percent`.
    pub fn percent(percent: f64) -> Self {
        Self {
            width: None,
            height: None,
            percent: Some(percent),
            preset: None,
            maintain_aspect: true,
            filter: ResizeFilter::default(),
        }
    }

    /// Explicit pixel size.
    pub fn pixels(width: Option<u32>, height: Option<u32>, maintain_aspect: bool) -> Self {
        Self {
            width,
            height,
            percent: None,
            preset: None,
            maintain_aspect,
            filter: ResizeFilter::default(),
        }
    }

    /// Target size for a source of `src_w` x `src_h`.
    pub fn target_dimensions(
        &self,
        src_w: u32,
        src_h: u32,
        ctx: &StageContext,
    ) -> PipelineResult<(u32, u32)> {
        self.validate(ctx)?;
        let (sw, sh) = (f64::from(src_w), f64::from(src_h));

        let (w, h) = if let Some(percent) = self.percent {
            (
                (sw * percent / 100.0).round(),
                (sh * percent / 100.0).round(),
            )
        } else if let Some(name) = &self.preset {
            let (pw, ph) = preset_dimensions(name)?;
            let pw = f64::from(pw);
            if self.maintain_aspect {
                (pw, (pw * sh / sw).round())
            } else {
                (pw, f64::from(ph))
            }
        } else {
            match (self.width, self.height) {
                (Some(w), Some(h)) if !self.maintain_aspect => (f64::from(w), f64::from(h)),
                (Some(w), _) => {
                    let w = f64::from(w);
                    let h = if self.maintain_aspect {
                        (w * sh / sw).round()
                    } else {
                        sh
                    };
                    (w, h)
                }
                (None, Some(h)) => {
                    let h = f64::from(h);
                    let w = if self.maintain_aspect {
                        (h * sw / sh).round()
                    } else {
                        sw
                    };
                    (w, h)
                }
                (None, None) => {
                    return Err(PipelineError::invalid(STAGE, "no target size given"));
                }
            }
        };

        if w < 1.0 || h < 1.0 {
            return Err(PipelineError::invalid(
                STAGE,
                format!("computed size {w}x{h} rounds to zero"),
            ));
        }
        let max = f64::from(ctx.max_dimension);
        if w > max || h > max {
            return Err(PipelineError::invalid(
                STAGE,
                format!("computed size {w}x{h} exceeds the {max}px limit"),
            ));
        }
        Ok((w as u32, h as u32))
    }
}

fn preset_dimensions(name: &str) -> PipelineResult<(u32, u32)> {
    PRESETS
        .iter()
        .find(|(preset, _, _)| preset.eq_ignore_ascii_case(name))
        .map(|&(_, w, h)| (w, h))
        .ok_or_else(|| PipelineError::invalid(STAGE, format!("unknown preset {name:?}")))
}

impl TransformStage for ResizeSpec {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        let has_pixels = self.width.is_some() || self.height.is_some();
        let sources = [has_pixels, self.percent.is_some(), self.preset.is_some()]
            .iter()
            .filter(|&&set| set)
            .count();
        if sources != 1 {
            return Err(PipelineError::invalid(
                STAGE,
                "set exactly one of width/height, percent, or preset",
            ));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(PipelineError::invalid(STAGE, "width and height must be > 0"));
        }
        if let Some(percent) = self.percent {
            check_range(STAGE, "percent", percent, f64::MIN_POSITIVE, 10_000.0)?;
        }
        if let Some(name) = &self.preset {
            preset_dimensions(name)?;
        }
        Ok(())
    }

    fn apply(&self, image: WorkingImage, ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let (src_w, src_h) = image.buffer.dimensions();
        let (w, h) = self.target_dimensions(src_w, src_h, ctx)?;
        if (w, h) == (src_w, src_h) {
            return Ok(image);
        }

        let resized = image::imageops::resize(
            &image.buffer.into_rgba_image(),
            w,
            h,
            self.filter.into(),
        );
        tracing::trace!("Resized {src_w}x{src_h} -> {w}x{h}");
        Ok(WorkingImage {
            buffer: RasterBuffer::from_rgba_image(resized)?,
            target: image.target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn dims(spec: &ResizeSpec, w: u32, h: u32) -> PipelineResult<(u32, u32)> {
        spec.target_dimensions(w, h, &StageContext::default())
    }

    #[test]
    fn percent_scales_both_sides() {
        assert_eq!(dims(&ResizeSpec::percent(50.0), 2000, 1000).unwrap(), (1000, 500));
        assert_eq!(dims(&ResizeSpec::percent(33.0), 100, 75).unwrap(), (33, 25));
    }

    #[test]
    fn width_only_derives_height() {
        let spec = ResizeSpec::pixels(Some(800), None, true);
        assert_eq!(dims(&spec, 1920, 1080).unwrap(), (800, 450));
        // 300 * 333 / 500 = 199.8 rounds to 200
        let spec = ResizeSpec::pixels(Some(300), None, true);
        assert_eq!(dims(&spec, 500, 333).unwrap(), (300, 200));
    }

    #[test]
    fn height_only_derives_width() {
        let spec = ResizeSpec::pixels(None, Some(300), true);
        assert_eq!(dims(&spec, 1600, 1200).unwrap(), (400, 300));
    }

    #[test]
    fn width_wins_when_both_set_with_aspect() {
        let spec = ResizeSpec::pixels(Some(400), Some(999), true);
        assert_eq!(dims(&spec, 800, 600).unwrap(), (400, 300));
    }

    #[test]
    fn explicit_pair_without_aspect() {
        let spec = ResizeSpec::pixels(Some(10), Some(90), false);
        assert_eq!(dims(&spec, 800, 600).unwrap(), (10, 90));
        let spec = ResizeSpec::pixels(Some(10), None, false);
        assert_eq!(dims(&spec, 800, 600).unwrap(), (10, 600));
    }

    #[test]
    fn presets() {
        let mut spec = ResizeSpec::pixels(None, None, false);
        spec.preset = Some("instagram-square".to_string());
        assert_eq!(dims(&spec, 4000, 3000).unwrap(), (1080, 1080));

        spec.maintain_aspect = true;
        assert_eq!(dims(&spec, 4000, 3000).unwrap(), (1080, 810));

        spec.preset = Some("poster".to_string());
        assert!(matches!(
            dims(&spec, 10, 10),
            Err(PipelineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(dims(&ResizeSpec::pixels(Some(0), None, true), 10, 10).is_err());
        assert!(dims(&ResizeSpec::pixels(None, None, true), 10, 10).is_err());
        assert!(dims(&ResizeSpec::percent(-5.0), 10, 10).is_err());
        assert!(dims(&ResizeSpec::percent(f64::NAN), 10, 10).is_err());

        let mut both = ResizeSpec::percent(50.0);
        both.width = Some(10);
        assert!(dims(&both, 10, 10).is_err());
    }

    #[test]
    fn rejects_sizes_rounding_to_zero_or_over_limit() {
        assert!(dims(&ResizeSpec::percent(1.0), 10, 10).is_err());
        let ctx = StageContext {
            max_dimension: 100,
            ..StageContext::default()
        };
        let err = ResizeSpec::percent(200.0)
            .target_dimensions(60, 60, &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn apply_produces_exact_size() {
        let out = ResizeSpec::pixels(Some(37), Some(11), false)
            .apply(working(gradient(100, 50)), &StageContext::default())
            .unwrap();
        assert_eq!(out.buffer.dimensions(), (37, 11));
        assert_eq!(out.buffer.pixels().len(), 37 * 11 * 4);
    }

    #[test]
    fn apply_same_size_is_noop() {
        let input = gradient(20, 10);
        let out = ResizeSpec::percent(100.0)
            .apply(working(input.clone()), &StageContext::default())
            .unwrap();
        assert_eq!(out.buffer, input);
    }
}
