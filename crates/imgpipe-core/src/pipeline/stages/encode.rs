//! Stages that change how the result is encoded rather than its pixels.

use serde::{Deserialize, Serialize};

use super::{check_range, resolve_format, EncodeTarget, StageContext, TransformStage, WorkingImage};
use crate::error::PipelineResult;
use crate::pipeline::raster::WHITE;

/// Switch to `target`, flattening onto white when the new format cannot
/// carry the buffer's transparency.
fn retarget(mut image: WorkingImage, target: EncodeTarget) -> WorkingImage {
    if !target.format.supports_alpha() && image.buffer.has_transparency() {
        tracing::trace!("Flattening transparency for {}", target.format);
        image.buffer.flatten_onto(WHITE);
    }
    image.target = target;
    image
}

/// Re-encode at `quality`, optionally into another format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressSpec {
    /// Encoder quality in [0, 1], passed through unchanged
    pub quality: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl TransformStage for CompressSpec {
    fn name(&self) -> &'static str {
        "compress"
    }

    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        check_range("compress", "quality", f64::from(self.quality), 0.0, 1.0)
    }

    fn apply(&self, image: WorkingImage, _ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let format = match &self.format {
            Some(requested) => resolve_format("compress", requested)?,
            None => image.target.format,
        };
        let target = EncodeTarget {
            format,
            quality: self.quality,
        };
        Ok(retarget(image, target))
    }
}

/// Change the output format, keeping the current quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertSpec {
    pub format: String,
}

impl TransformStage for ConvertSpec {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        resolve_format("convert", &self.format).map(|_| ())
    }

    fn apply(&self, image: WorkingImage, _ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let target = EncodeTarget {
            format: resolve_format("convert", &self.format)?,
            quality: image.target.quality,
        };
        Ok(retarget(image, target))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::format::OutputFormat;
    use crate::pipeline::raster::RasterBuffer;

    fn half_transparent() -> RasterBuffer {
        let mut buf = RasterBuffer::filled(2, 2, [0, 0, 0, 255]).unwrap();
        buf.set_pixel(0, 0, [0, 0, 0, 0]);
        buf
    }

    #[test]
    fn convert_to_jpeg_flattens_onto_white() {
        let spec = ConvertSpec {
            format: "jpeg".to_string(),
        };
        let out = spec
            .apply(working(half_transparent()), &StageContext::default())
            .unwrap();
        assert_eq!(out.target.format, OutputFormat::Jpeg);
        assert_eq!(out.target.quality, 0.92);
        assert_eq!(out.buffer.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(out.buffer.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn convert_to_webp_keeps_alpha() {
        let spec = ConvertSpec {
            format: "image/webp".to_string(),
        };
        let out = spec
            .apply(working(half_transparent()), &StageContext::default())
            .unwrap();
        assert_eq!(out.target.format, OutputFormat::Webp);
        assert_eq!(out.buffer.pixel(0, 0)[3], 0);
    }

    #[test]
    fn convert_rejects_unavailable_format() {
        let spec = ConvertSpec {
            format: "avif".to_string(),
        };
        let err = spec.validate(&StageContext::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EncodingUnavailable { stage: "convert", .. }
        ));
    }

    #[test]
    fn compress_sets_quality_without_touching_pixels() {
        let input = gradient(8, 8);
        let spec = CompressSpec {
            quality: 0.4,
            format: None,
        };
        let out = spec
            .apply(working(input.clone()), &StageContext::default())
            .unwrap();
        assert_eq!(out.target.format, OutputFormat::Png);
        assert_eq!(out.target.quality, 0.4);
        assert_eq!(out.buffer, input);
    }

    #[test]
    fn compress_into_jpeg_flattens() {
        let spec = CompressSpec {
            quality: 0.7,
            format: Some("jpg".to_string()),
        };
        let out = spec
            .apply(working(half_transparent()), &StageContext::default())
            .unwrap();
        assert_eq!(out.target.format, OutputFormat::Jpeg);
        assert!(!out.buffer.has_transparency());
    }

    #[test]
    fn compress_quality_range() {
        let ctx = StageContext::default();
        for quality in [-0.1, 1.01, f32::NAN] {
            let spec = CompressSpec {
                quality,
                format: None,
            };
            assert!(spec.validate(&ctx).is_err(), "{quality}");
        }
    }
}
