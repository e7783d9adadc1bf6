use serde::{Deserialize, Serialize};

use super::{StageContext, TransformStage, WorkingImage};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::raster::RasterBuffer;

const STAGE: &str = "crop";

/// Rectangle to keep, in source pixels.
///
/// The rectangle is clamped to the image bounds. A rectangle that misses the
/// image entirely is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSpec {
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl CropSpec {
    /// The rectangle after clamping to a `width` x `height` source, as
    /// `(x, y, w, h)`.
    pub fn clamped(&self, width: u32, height: u32) -> PipelineResult<(u32, u32, u32, u32)> {
        let left = self.x.clamp(0, i64::from(width));
        let top = self.y.clamp(0, i64::from(height));
        let right = self.x.saturating_add(i64::from(self.width)).clamp(0, i64::from(width));
        let bottom = self.y.saturating_add(i64::from(self.height)).clamp(0, i64::from(height));

        if right <= left || bottom <= top {
            return Err(PipelineError::invalid(
                STAGE,
                format!(
                    "rectangle {}x{} at ({}, {}) lies outside the {width}x{height} image",
                    self.width, self.height, self.x, self.y
                ),
            ));
        }
        Ok((
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

impl TransformStage for CropSpec {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::invalid(STAGE, "width and height must be > 0"));
        }
        Ok(())
    }

    fn apply(&self, image: WorkingImage, _ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let (src_w, src_h) = image.buffer.dimensions();
        let (x, y, w, h) = self.clamped(src_w, src_h)?;
        if (x, y, w, h) == (0, 0, src_w, src_h) {
            return Ok(image);
        }

        let src_row = src_w as usize * 4;
        let row_len = w as usize * 4;
        let pixels = image.buffer.pixels();
        let mut out = Vec::with_capacity(row_len * h as usize);
        for row in y..y + h {
            let start = row as usize * src_row + x as usize * 4;
            out.extend_from_slice(&pixels[start..start + row_len]);
        }

        Ok(WorkingImage {
            buffer: RasterBuffer::from_raw(w, h, out)?,
            target: image.target,
        })
    }
}
