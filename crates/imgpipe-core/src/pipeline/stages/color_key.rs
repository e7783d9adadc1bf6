use serde::{Deserialize, Serialize};

use super::{StageContext, TransformStage, WorkingImage};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::raster::parse_hex_color;

const STAGE: &str = "color-key-remove";

/// How distance from the reference color is measured. Alpha is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    /// Largest per-channel difference
    #[default]
    PerChannel,
    /// Straight-line distance in RGB space
    Euclidean,
}

impl DistanceMetric {
    fn within(self, a: [u8; 4], b: [u8; 4], tolerance: u32) -> bool {
        let diff = |c: usize| (i32::from(a[c]) - i32::from(b[c])).unsigned_abs();
        match self {
            Self::PerChannel => (0..3).all(|c| diff(c) <= tolerance),
            Self::Euclidean => {
                let sq: u32 = (0..3).map(|c| diff(c) * diff(c)).sum();
                sq <= tolerance * tolerance
            }
        }
    }
}

/// Make pixels close to a reference color fully transparent.
///
/// The reference is either an explicit `color` or the pixel at `sample`;
/// with neither, it is white.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorKeySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<(u32, u32)>,
    #[serde(default = "default_tolerance")]
    pub tolerance: u32,
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_tolerance() -> u32 {
    30
}

impl Default for ColorKeySpec {
    fn default() -> Self {
        Self {
            color: None,
            sample: None,
            tolerance: default_tolerance(),
            metric: DistanceMetric::default(),
        }
    }
}

impl TransformStage for ColorKeySpec {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        if self.tolerance > 255 {
            return Err(PipelineError::invalid(
                STAGE,
                format!("tolerance must be between 0 and 255, got {}", self.tolerance),
            ));
        }
        if self.color.is_some() && self.sample.is_some() {
            return Err(PipelineError::invalid(STAGE, "set either color or sample, not both"));
        }
        if let Some(color) = &self.color {
            if parse_hex_color(color).is_none() {
                return Err(PipelineError::invalid(
                    STAGE,
                    format!("color {color:?} is not #rrggbb"),
                ));
            }
        }
        Ok(())
    }

    fn apply(&self, mut image: WorkingImage, _ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let reference = match (&self.color, self.sample) {
            (Some(color), _) => parse_hex_color(color)
                .ok_or_else(|| PipelineError::invalid(STAGE, format!("bad color {color:?}")))?,
            (None, Some((x, y))) => {
                let (w, h) = image.buffer.dimensions();
                if x >= w || y >= h {
                    return Err(PipelineError::invalid(
                        STAGE,
                        format!("sample ({x}, {y}) is outside the {w}x{h} image"),
                    ));
                }
                image.buffer.pixel(x, y)
            }
            (None, None) => [255, 255, 255, 255],
        };

        let mut removed = 0usize;
        for p in image.buffer.pixels_mut().chunks_exact_mut(4) {
            let px = [p[0], p[1], p[2], p[3]];
            if self.metric.within(px, reference, self.tolerance) {
                p[3] = 0;
                removed += 1;
            }
        }
        tracing::trace!("Color key removed {removed} pixel(s)");
        Ok(image)
    }
}
