use image::imageops;
use serde::{Deserialize, Serialize};

use super::{StageContext, TransformStage, WorkingImage};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::raster::RasterBuffer;

const STAGE: &str = "rotate";

/// Rotation about the image center, with optional mirroring.
///
/// Positive angles turn clockwise. Flips are applied to the source before
/// rotating. The output canvas is the bounding box of the rotated image;
/// uncovered corners are transparent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotateSpec {
    #[serde(default)]
    pub degrees: f64,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
}

impl RotateSpec {
    pub fn degrees(degrees: f64) -> Self {
        Self {
            degrees,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }
}

/// Canvas size needed to hold a `width` x `height` image rotated by `degrees`.
pub fn bounding_box(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    match right_angle(degrees) {
        Some(0 | 180) => return (width, height),
        Some(_) => return (height, width),
        None => {}
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (w, h) = (f64::from(width), f64::from(height));
    let bw = w * cos.abs() + h * sin.abs();
    let bh = w * sin.abs() + h * cos.abs();
    ((bw.round() as u32).max(1), (bh.round() as u32).max(1))
}

/// Normalized angle when it is a whole multiple of 90 degrees.
fn right_angle(degrees: f64) -> Option<u32> {
    let normalized = degrees.rem_euclid(360.0);
    let quarter = (normalized / 90.0).round();
    if (normalized - quarter * 90.0).abs() < 1e-9 {
        Some((quarter as u32 % 4) * 90)
    } else {
        None
    }
}

fn rotate_free(src: &RasterBuffer, degrees: f64) -> PipelineResult<RasterBuffer> {
    let (w, h) = src.dimensions();
    let (out_w, out_h) = bounding_box(w, h, degrees);
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (src_cx, src_cy) = (f64::from(w) / 2.0, f64::from(h) / 2.0);
    let (dst_cx, dst_cy) = (f64::from(out_w) / 2.0, f64::from(out_h) / 2.0);

    let mut out = RasterBuffer::new(out_w, out_h)?;
    for y in 0..out_h {
        let dy = f64::from(y) + 0.5 - dst_cy;
        for x in 0..out_w {
            let dx = f64::from(x) + 0.5 - dst_cx;
            // Inverse of a clockwise turn in y-down coordinates
            let sx = cos * dx + sin * dy + src_cx;
            let sy = -sin * dx + cos * dy + src_cy;
            let px = src.sample_bilinear(sx, sy);
            if px[3] > 0 {
                out.set_pixel(x, y, px);
            }
        }
    }
    Ok(out)
}

impl TransformStage for RotateSpec {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        if !self.degrees.is_finite() {
            return Err(PipelineError::invalid(STAGE, "degrees must be a finite number"));
        }
        Ok(())
    }

    fn apply(&self, image: WorkingImage, ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let WorkingImage { mut buffer, target } = image;
        if self.flip_horizontal {
            buffer.flip_horizontal();
        }
        if self.flip_vertical {
            buffer.flip_vertical();
        }

        let buffer = match right_angle(self.degrees) {
            Some(0) => buffer,
            Some(90) => RasterBuffer::from_rgba_image(imageops::rotate90(&buffer.into_rgba_image()))?,
            Some(180) => {
                RasterBuffer::from_rgba_image(imageops::rotate180(&buffer.into_rgba_image()))?
            }
            Some(_) => {
                RasterBuffer::from_rgba_image(imageops::rotate270(&buffer.into_rgba_image()))?
            }
            None => {
                let (w, h) = bounding_box(buffer.width(), buffer.height(), self.degrees);
                if w > ctx.max_dimension || h > ctx.max_dimension {
                    return Err(PipelineError::invalid(
                        STAGE,
                        format!("rotated canvas {w}x{h} exceeds the {}px limit", ctx.max_dimension),
                    ));
                }
                rotate_free(&buffer, self.degrees)?
            }
        };

        Ok(WorkingImage { buffer, target })
    }
}
