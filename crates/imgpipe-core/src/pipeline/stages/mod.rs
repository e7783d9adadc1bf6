//! Transform stages.
//!
//! A run is an ordered list of [`TransformSpec`]s. Each variant carries only
//! its own parameters and implements [`TransformStage`]; the enum dispatches
//! through a single [`TransformSpec::apply`] entry point.
//!
//! Stages operate on a [`WorkingImage`]: the raster buffer plus the encode
//! target it will eventually be exported with. Geometry stages (resize, crop,
//! rotate) replace the buffer, pixel stages (filter, color key, watermark)
//! mutate it in place, and encoding stages (compress, convert) adjust the
//! target. The actual encode happens once, when the runner finishes the item.

mod color_key;
mod crop;
mod encode;
mod filter;
mod resize;
mod rotate;
mod watermark;

pub use color_key::{ColorKeySpec, DistanceMetric};
pub use crop::CropSpec;
pub use encode::{CompressSpec, ConvertSpec};
pub use filter::FilterSpec;
pub use resize::{ResizeFilter, ResizeSpec, PRESETS};
pub use rotate::{bounding_box, RotateSpec};
pub use watermark::{anchor_origin, measure_text, Anchor, WatermarkSpec};

use serde::{Deserialize, Serialize};

use super::format::OutputFormat;
use super::raster::{parse_hex_color, RasterBuffer};
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};

/// Where a working image will be encoded to at export time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeTarget {
    pub format: OutputFormat,
    /// Quality factor in [0, 1]
    pub quality: f32,
}

/// The value passed from stage to stage.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    pub buffer: RasterBuffer,
    pub target: EncodeTarget,
}

impl WorkingImage {
    pub fn new(buffer: RasterBuffer, target: EncodeTarget) -> Self {
        Self { buffer, target }
    }
}

/// Run-wide values stages need besides their own parameters.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Largest width or height a stage may allocate
    pub max_dimension: u32,
    /// Watermark padding when the step does not set one
    pub watermark_padding: u32,
    /// Watermark text height when the step does not set one
    pub watermark_font_size: u32,
    /// Watermark color when the step does not set one
    pub watermark_color: [u8; 4],
}

impl StageContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_dimension: config.limits.max_image_dimension,
            watermark_padding: config.watermark.padding,
            watermark_font_size: config.watermark.font_size,
            watermark_color: parse_hex_color(&config.watermark.color)
                .unwrap_or([255, 255, 255, 255]),
        }
    }
}

impl Default for StageContext {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One unit of work over a [`WorkingImage`].
pub trait TransformStage {
    /// Short operation name, e.g. `resize`.
    fn name(&self) -> &'static str;

    /// Check parameters that do not depend on the image.
    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        Ok(())
    }

    /// Apply the stage.
    fn apply(&self, image: WorkingImage, ctx: &StageContext) -> PipelineResult<WorkingImage>;
}

/// A transform step with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransformSpec {
    Compress(CompressSpec),
    Resize(ResizeSpec),
    Crop(CropSpec),
    Rotate(RotateSpec),
    Watermark(WatermarkSpec),
    #[serde(alias = "remove-bg", alias = "color-key")]
    ColorKeyRemove(ColorKeySpec),
    Filter(FilterSpec),
    Convert(ConvertSpec),
}

impl TransformSpec {
    fn stage(&self) -> &dyn TransformStage {
        match self {
            Self::Compress(s) => s,
            Self::Resize(s) => s,
            Self::Crop(s) => s,
            Self::Rotate(s) => s,
            Self::Watermark(s) => s,
            Self::ColorKeyRemove(s) => s,
            Self::Filter(s) => s,
            Self::Convert(s) => s,
        }
    }

    /// Operation name.
    pub fn kind(&self) -> &'static str {
        self.stage().name()
    }

    /// Past-tense label used to prefix exported file names.
    pub fn label(&self) -> &'static str {
        operation_label(self.kind()).unwrap_or("processed")
    }

    /// Check parameters that do not depend on the image.
    pub fn validate(&self, ctx: &StageContext) -> PipelineResult<()> {
        self.stage().validate(ctx)
    }

    /// Validate, then apply.
    pub fn apply(&self, image: WorkingImage, ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let stage = self.stage();
        stage.validate(ctx)?;
        stage.apply(image, ctx)
    }
}

/// Past-tense label for an operation name, e.g. `compress` -> `compressed`.
/// Accepts the same aliases as the `kind` tag.
pub fn operation_label(operation: &str) -> Option<&'static str> {
    let label = match operation {
        "compress" => "compressed",
        "resize" => "resized",
        "crop" => "cropped",
        "rotate" => "rotated",
        "watermark" => "watermarked",
        "color-key-remove" | "color-key" | "remove-bg" => "nobg",
        "filter" => "filtered",
        "convert" => "converted",
        _ => return None,
    };
    Some(label)
}

/// Label for a whole run: the single stage's label, or `processed`.
pub fn run_label(specs: &[TransformSpec]) -> &'static str {
    match specs {
        [only] => only.label(),
        _ => "processed",
    }
}

/// Check a float parameter against an inclusive range.
pub(crate) fn check_range(
    stage: &'static str,
    field: &str,
    value: f64,
    min: f64,
    max: f64,
) -> PipelineResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(PipelineError::invalid(
            stage,
            format!("{field} must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}

/// Resolve a requested output format, or report it as unavailable.
pub(crate) fn resolve_format(stage: &'static str, requested: &str) -> PipelineResult<OutputFormat> {
    OutputFormat::parse(requested).ok_or_else(|| PipelineError::EncodingUnavailable {
        stage,
        format: requested.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Opaque buffer with a gradient so geometry changes are visible.
    pub fn gradient(width: u32, height: u32) -> RasterBuffer {
        let mut buf = RasterBuffer::new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                buf.set_pixel(x, y, [(x % 256) as u8, (y % 256) as u8, 128, 255]);
            }
        }
        buf
    }

    pub fn working(buffer: RasterBuffer) -> WorkingImage {
        WorkingImage::new(
            buffer,
            EncodeTarget {
                format: OutputFormat::Png,
                quality: 0.92,
            },
        )
    }
}
