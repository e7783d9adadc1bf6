use serde::{Deserialize, Serialize};

use super::{check_range, StageContext, TransformStage, WorkingImage};
use crate::error::PipelineResult;
use crate::pipeline::raster::RasterBuffer;

const STAGE: &str = "filter";

/// Per-pixel color effects and blur. Alpha is preserved by every effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "kebab-case")]
pub enum FilterSpec {
    Grayscale,
    Sepia,
    Invert,
    /// Multiply channels by `amount` (1.0 leaves the image unchanged)
    Brightness { amount: f64 },
    /// Scale channel distance from mid-gray by `amount`
    Contrast { amount: f64 },
    /// Gaussian blur with sigma `radius`
    Blur { radius: f64 },
}

fn channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn map_rgb(buffer: &mut RasterBuffer, f: impl Fn(f64, f64, f64) -> [f64; 3]) {
    for p in buffer.pixels_mut().chunks_exact_mut(4) {
        let [r, g, b] = f(f64::from(p[0]), f64::from(p[1]), f64::from(p[2]));
        p[0] = channel(r);
        p[1] = channel(g);
        p[2] = channel(b);
    }
}

impl TransformStage for FilterSpec {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn validate(&self, _ctx: &StageContext) -> PipelineResult<()> {
        match *self {
            Self::Brightness { amount } | Self::Contrast { amount } => {
                check_range(STAGE, "amount", amount, 0.0, 10.0)
            }
            Self::Blur { radius } => check_range(STAGE, "radius", radius, 0.0, 100.0),
            Self::Grayscale | Self::Sepia | Self::Invert => Ok(()),
        }
    }

    fn apply(&self, mut image: WorkingImage, _ctx: &StageContext) -> PipelineResult<WorkingImage> {
        let buffer = &mut image.buffer;
        match *self {
            Self::Grayscale => map_rgb(buffer, |r, g, b| {
                let mean = (r + g + b) / 3.0;
                [mean, mean, mean]
            }),
            Self::Sepia => map_rgb(buffer, |r, g, b| {
                [
                    0.393 * r + 0.769 * g + 0.189 * b,
                    0.349 * r + 0.686 * g + 0.168 * b,
                    0.272 * r + 0.534 * g + 0.131 * b,
                ]
            }),
            Self::Invert => map_rgb(buffer, |r, g, b| [255.0 - r, 255.0 - g, 255.0 - b]),
            Self::Brightness { amount } => {
                map_rgb(buffer, |r, g, b| [r * amount, g * amount, b * amount])
            }
            Self::Contrast { amount } => map_rgb(buffer, |r, g, b| {
                let c = |v: f64| (v - 128.0) * amount + 128.0;
                [c(r), c(g), c(b)]
            }),
            Self::Blur { radius } => {
                if radius > 0.0 {
                    let blurred =
                        image::imageops::blur(&buffer.to_rgba_image(), radius as f32);
                    *buffer = RasterBuffer::from_rgba_image(blurred)?;
                }
            }
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn one_pixel(color: [u8; 4], filter: FilterSpec) -> [u8; 4] {
        let buf = RasterBuffer::filled(1, 1, color).unwrap();
        filter
            .apply(working(buf), &StageContext::default())
            .unwrap()
            .buffer
            .pixel(0, 0)
    }

    #[test]
    fn grayscale_is_rounded_mean() {
        assert_eq!(one_pixel([10, 20, 31, 200], FilterSpec::Grayscale), [20, 20, 20, 200]);
        assert_eq!(one_pixel([0, 0, 2, 255], FilterSpec::Grayscale), [1, 1, 1, 255]);
    }

    #[test]
    fn sepia_matrix_clamps() {
        assert_eq!(one_pixel([100, 100, 100, 255], FilterSpec::Sepia), [135, 120, 94, 255]);
        assert_eq!(one_pixel([255, 255, 255, 255], FilterSpec::Sepia), [255, 255, 239, 255]);
    }

    #[test]
    fn invert() {
        assert_eq!(one_pixel([0, 100, 255, 9], FilterSpec::Invert), [255, 155, 0, 9]);
    }

    #[test]
    fn brightness_and_contrast() {
        let identity = FilterSpec::Brightness { amount: 1.0 };
        assert_eq!(one_pixel([12, 34, 56, 255], identity), [12, 34, 56, 255]);
        let brighter = FilterSpec::Brightness { amount: 1.5 };
        assert_eq!(one_pixel([100, 200, 0, 255], brighter), [150, 255, 0, 255]);

        let flat = FilterSpec::Contrast { amount: 0.0 };
        assert_eq!(one_pixel([0, 77, 255, 255], flat), [128, 128, 128, 255]);
        let punchy = FilterSpec::Contrast { amount: 2.0 };
        assert_eq!(one_pixel([100, 128, 160, 255], punchy), [72, 128, 192, 255]);
    }

    #[test]
    fn blur_softens_edges() {
        let mut buf = RasterBuffer::filled(9, 9, [0, 0, 0, 255]).unwrap();
        buf.set_pixel(4, 4, [255, 255, 255, 255]);
        let out = FilterSpec::Blur { radius: 1.5 }
            .apply(working(buf), &StageContext::default())
            .unwrap()
            .buffer;
        assert_eq!(out.dimensions(), (9, 9));
        assert!(out.pixel(4, 4)[0] < 255);
        assert!(out.pixel(3, 4)[0] > 0);
    }

    #[test]
    fn zero_radius_blur_is_noop() {
        let input = gradient(6, 6);
        let out = FilterSpec::Blur { radius: 0.0 }
            .apply(working(input.clone()), &StageContext::default())
            .unwrap();
        assert_eq!(out.buffer, input);
    }

    #[test]
    fn validation() {
        let ctx = StageContext::default();
        assert!(FilterSpec::Brightness { amount: 11.0 }.validate(&ctx).is_err());
        assert!(FilterSpec::Contrast { amount: -0.1 }.validate(&ctx).is_err());
        assert!(FilterSpec::Blur { radius: 101.0 }.validate(&ctx).is_err());
        assert!(FilterSpec::Blur { radius: 100.0 }.validate(&ctx).is_ok());
    }
}
