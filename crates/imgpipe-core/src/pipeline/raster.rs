//! Owned RGBA pixel surface that every transform stage reads and writes.

use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use std::io::Cursor;

use super::format::OutputFormat;
use crate::error::{PipelineError, PipelineResult};

/// Solid white, the background used when flattening transparency.
pub const WHITE: [u8; 3] = [255, 255, 255];

/// A row-major RGBA8 pixel buffer.
///
/// Invariant: `width > 0`, `height > 0` and `pixels.len() == width * height * 4`.
/// Every constructor checks it, so stages can index without bounds surprises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterBuffer {
    /// Allocate a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> PipelineResult<Self> {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    /// Allocate a buffer filled with one color.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> PipelineResult<Self> {
        let len = checked_len(width, height)?;
        let pixels = color.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Wrap an existing RGBA byte vector.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> PipelineResult<Self> {
        let expected = checked_len(width, height)?;
        if pixels.len() != expected {
            return Err(PipelineError::BufferShapeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Take ownership of an `RgbaImage`.
    pub fn from_rgba_image(image: RgbaImage) -> PipelineResult<Self> {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, image.into_raw())
    }

    /// Draw a decoded image into a new buffer.
    ///
    /// Without a target the buffer has the image's natural size. With a target
    /// the image is scaled to exactly that size.
    pub fn from_image(image: &DynamicImage, target: Option<(u32, u32)>) -> PipelineResult<Self> {
        Self::from_image_with_filter(image, target, FilterType::Triangle)
    }

    /// Like [`RasterBuffer::from_image`] with an explicit resampling filter.
    pub fn from_image_with_filter(
        image: &DynamicImage,
        target: Option<(u32, u32)>,
        filter: FilterType,
    ) -> PipelineResult<Self> {
        let rgba = image.to_rgba8();
        match target {
            Some((w, h)) if (w, h) != rgba.dimensions() => {
                checked_len(w, h)?;
                Self::from_rgba_image(image::imageops::resize(&rgba, w, h, filter))
            }
            _ => Self::from_rgba_image(rgba),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable raw RGBA bytes for per-pixel algorithms.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Replace the pixel data. The length must stay `width * height * 4`.
    pub fn put_pixels(&mut self, pixels: Vec<u8>) -> PipelineResult<()> {
        let expected = self.pixels.len();
        if pixels.len() != expected {
            return Err(PipelineError::BufferShapeMismatch {
                width: self.width,
                height: self.height,
                expected,
                actual: pixels.len(),
            });
        }
        self.pixels = pixels;
        Ok(())
    }

    /// Read one pixel. Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Overwrite one pixel. Panics when out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let i = self.offset(x, y);
        self.pixels[i..i + 4].copy_from_slice(&color);
    }

    /// Overwrite every pixel with `color`.
    pub fn fill(&mut self, color: [u8; 4]) {
        for p in self.pixels.chunks_exact_mut(4) {
            p.copy_from_slice(&color);
        }
    }

    /// Composite `color` over the pixel at `(x, y)` (source-over).
    /// Coordinates outside the buffer are ignored.
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let i = self.offset(x as u32, y as u32);
        let dst = &mut self.pixels[i..i + 4];
        let sa = f32::from(color[3]) / 255.0;
        if sa <= 0.0 {
            return;
        }
        let da = f32::from(dst[3]) / 255.0;
        let out_a = sa + da * (1.0 - sa);
        for c in 0..3 {
            let s = f32::from(color[c]) * sa;
            let d = f32::from(dst[c]) * da * (1.0 - sa);
            dst[c] = ((s + d) / out_a).round().clamp(0.0, 255.0) as u8;
        }
        dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    /// True when any pixel is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.pixels.chunks_exact(4).any(|p| p[3] < 255)
    }

    /// Composite the buffer onto an opaque background, leaving every pixel
    /// with alpha 255.
    pub fn flatten_onto(&mut self, background: [u8; 3]) {
        for p in self.pixels.chunks_exact_mut(4) {
            let a = u32::from(p[3]);
            if a == 255 {
                continue;
            }
            for c in 0..3 {
                let v = (u32::from(p[c]) * a + u32::from(background[c]) * (255 - a) + 127) / 255;
                p[c] = v as u8;
            }
            p[3] = 255;
        }
    }

    /// Mirror left to right in place.
    pub fn flip_horizontal(&mut self) {
        let row_len = self.width as usize * 4;
        for row in self.pixels.chunks_exact_mut(row_len) {
            let w = row.len() / 4;
            for x in 0..w / 2 {
                let (a, b) = (x * 4, (w - 1 - x) * 4);
                for c in 0..4 {
                    row.swap(a + c, b + c);
                }
            }
        }
    }

    /// Mirror top to bottom in place.
    pub fn flip_vertical(&mut self) {
        let row_len = self.width as usize * 4;
        let h = self.height as usize;
        for y in 0..h / 2 {
            let (top, rest) = self.pixels.split_at_mut((h - 1 - y) * row_len);
            top[y * row_len..(y + 1) * row_len].swap_with_slice(&mut rest[..row_len]);
        }
    }

    /// Sample at continuous coordinates with bilinear interpolation.
    ///
    /// Pixel centers sit at `(x + 0.5, y + 0.5)`. Samples outside the buffer
    /// count as transparent, so edges fade out instead of smearing.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> [u8; 4] {
        let fx = x - 0.5;
        let fy = y - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;

        let mut acc = [0.0f64; 4];
        for (dx, dy, w) in [
            (0.0, 0.0, (1.0 - tx) * (1.0 - ty)),
            (1.0, 0.0, tx * (1.0 - ty)),
            (0.0, 1.0, (1.0 - tx) * ty),
            (1.0, 1.0, tx * ty),
        ] {
            if w <= 0.0 {
                continue;
            }
            let sx = x0 + dx;
            let sy = y0 + dy;
            if sx < 0.0 || sy < 0.0 || sx >= f64::from(self.width) || sy >= f64::from(self.height)
            {
                continue;
            }
            let p = self.pixel(sx as u32, sy as u32);
            let a = f64::from(p[3]) * w;
            acc[0] += f64::from(p[0]) * a;
            acc[1] += f64::from(p[1]) * a;
            acc[2] += f64::from(p[2]) * a;
            acc[3] += a;
        }

        if acc[3] <= 0.0 {
            return [0, 0, 0, 0];
        }
        [
            (acc[0] / acc[3]).round().clamp(0.0, 255.0) as u8,
            (acc[1] / acc[3]).round().clamp(0.0, 255.0) as u8,
            (acc[2] / acc[3]).round().clamp(0.0, 255.0) as u8,
            acc[3].round().clamp(0.0, 255.0) as u8,
        ]
    }

    /// Copy into an `RgbaImage` for `image::imageops` algorithms.
    pub fn to_rgba_image(&self) -> RgbaImage {
        self.clone().into_rgba_image()
    }

    /// Convert into an `RgbaImage` without copying.
    pub fn into_rgba_image(self) -> RgbaImage {
        // Length invariant guarantees the conversion succeeds.
        RgbaImage::from_raw(self.width, self.height, self.pixels)
            .unwrap_or_else(|| RgbaImage::new(1, 1))
    }

    /// Encode synchronously into `format`.
    ///
    /// `quality` in [0, 1] is passed straight to lossy encoders and ignored by
    /// lossless ones. Formats without alpha drop the channel; callers that
    /// care flatten first (see the convert and compress stages).
    pub fn encode(&self, format: OutputFormat, quality: f32) -> PipelineResult<Vec<u8>> {
        let mut buffer = Vec::new();
        let fail = |e: image::ImageError| {
            PipelineError::UnsupportedEncoding(format!("{} encoder failed: {e}", format))
        };

        match format {
            OutputFormat::Jpeg => {
                let rgb = self.to_rgb_bytes();
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    Cursor::new(&mut buffer),
                    quality_percent(quality),
                );
                encoder
                    .write_image(&rgb, self.width, self.height, ExtendedColorType::Rgb8)
                    .map_err(fail)?;
            }
            OutputFormat::Bmp => {
                let rgb = self.to_rgb_bytes();
                image::codecs::bmp::BmpEncoder::new(&mut Cursor::new(&mut buffer))
                    .write_image(&rgb, self.width, self.height, ExtendedColorType::Rgb8)
                    .map_err(fail)?;
            }
            OutputFormat::Png | OutputFormat::Webp | OutputFormat::Gif => {
                let image = self.to_rgba_image();
                image
                    .write_to(&mut Cursor::new(&mut buffer), format.image_format())
                    .map_err(fail)?;
            }
        }

        Ok(buffer)
    }

    /// Encode to the media type `mime` on the blocking thread pool.
    ///
    /// Fails with [`PipelineError::UnsupportedEncoding`] when the media type
    /// has no encoder.
    pub async fn to_encoded_bytes(&self, mime: &str, quality: f32) -> PipelineResult<Vec<u8>> {
        let format = OutputFormat::parse(mime)
            .ok_or_else(|| PipelineError::UnsupportedEncoding(mime.to_string()))?;
        self.clone().into_encoded_bytes(format, quality).await
    }

    /// Encode on the blocking thread pool, consuming the buffer.
    pub async fn into_encoded_bytes(
        self,
        format: OutputFormat,
        quality: f32,
    ) -> PipelineResult<Vec<u8>> {
        tokio::task::spawn_blocking(move || self.encode(format, quality))
            .await
            .map_err(|e| PipelineError::UnsupportedEncoding(format!("encoder task failed: {e}")))?
    }

    fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect()
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        (y as usize * self.width as usize + x as usize) * 4
    }
}

/// Map a [0, 1] quality factor onto the 1..=100 scale encoders expect.
pub fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Parse `#rrggbb` or `#rrggbbaa` into RGBA.
pub fn parse_hex_color(input: &str) -> Option<[u8; 4]> {
    let hex = input.trim().strip_prefix('#')?;
    if !hex.is_ascii() || !(hex.len() == 6 || hex.len() == 8) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { byte(6)? } else { 255 };
    Some([byte(0)?, byte(2)?, byte(4)?, alpha])
}

fn checked_len(width: u32, height: u32) -> PipelineResult<usize> {
    if width == 0 || height == 0 {
        return Err(PipelineError::invalid(
            "raster",
            format!("dimensions must be positive, got {width}x{height}"),
        ));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            PipelineError::invalid("raster", format!("{width}x{height} does not fit in memory"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> RasterBuffer {
        let mut buf = RasterBuffer::new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                buf.set_pixel(x, y, [v, x as u8, y as u8, 255]);
            }
        }
        buf
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(RasterBuffer::new(0, 10).is_err());
        assert!(RasterBuffer::new(10, 0).is_err());
    }

    #[test]
    fn from_raw_checks_length() {
        let err = RasterBuffer::from_raw(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::BufferShapeMismatch {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn put_pixels_rejects_wrong_length() {
        let mut buf = RasterBuffer::new(3, 3).unwrap();
        assert!(buf.put_pixels(vec![1; 36]).is_ok());
        let err = buf.put_pixels(vec![1; 35]).unwrap_err();
        assert!(matches!(err, PipelineError::BufferShapeMismatch { .. }));
        // Failed write leaves the data untouched
        assert_eq!(buf.pixel(0, 0), [1, 1, 1, 1]);
    }

    #[test]
    fn from_image_natural_and_target_size() {
        let img = DynamicImage::new_rgb8(40, 20);
        let natural = RasterBuffer::from_image(&img, None).unwrap();
        assert_eq!(natural.dimensions(), (40, 20));

        let scaled = RasterBuffer::from_image(&img, Some((13, 7))).unwrap();
        assert_eq!(scaled.dimensions(), (13, 7));
        assert_eq!(scaled.pixels().len(), 13 * 7 * 4);
    }

    #[test]
    fn blend_pixel_half_alpha_over_black() {
        let mut buf = RasterBuffer::filled(1, 1, [0, 0, 0, 255]).unwrap();
        buf.blend_pixel(0, 0, [255, 255, 255, 128]);
        let p = buf.pixel(0, 0);
        assert_eq!(p[3], 255);
        assert!((127..=129).contains(&p[0]));
    }

    #[test]
    fn blend_pixel_ignores_out_of_bounds() {
        let mut buf = RasterBuffer::new(2, 2).unwrap();
        buf.blend_pixel(-1, 0, [255, 0, 0, 255]);
        buf.blend_pixel(2, 1, [255, 0, 0, 255]);
        assert!(buf.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn flatten_makes_transparent_pixels_white() {
        let mut buf = RasterBuffer::new(2, 1).unwrap();
        buf.set_pixel(1, 0, [10, 20, 30, 255]);
        assert!(buf.has_transparency());

        buf.flatten_onto(WHITE);
        assert!(!buf.has_transparency());
        assert_eq!(buf.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(buf.pixel(1, 0), [10, 20, 30, 255]);
    }

    #[test]
    fn flips_are_involutions() {
        let original = checker(5, 3);
        let mut buf = original.clone();
        buf.flip_horizontal();
        assert_eq!(buf.pixel(0, 0), original.pixel(4, 0));
        buf.flip_horizontal();
        assert_eq!(buf, original);

        buf.flip_vertical();
        assert_eq!(buf.pixel(2, 0), original.pixel(2, 2));
        buf.flip_vertical();
        assert_eq!(buf, original);
    }

    #[test]
    fn bilinear_at_pixel_center_is_exact() {
        let buf = checker(4, 4);
        assert_eq!(buf.sample_bilinear(1.5, 2.5), buf.pixel(1, 2));
    }

    #[test]
    fn bilinear_outside_is_transparent() {
        let buf = checker(4, 4);
        assert_eq!(buf.sample_bilinear(-3.0, 1.0), [0, 0, 0, 0]);
    }

    #[test]
    fn encode_png_and_jpeg() {
        let buf = checker(8, 8);
        let png = buf.encode(OutputFormat::Png, 1.0).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let jpeg = buf.encode(OutputFormat::Jpeg, 0.8).unwrap();
        assert_eq!(&jpeg[0..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn to_encoded_bytes_rejects_unknown_mime() {
        let buf = checker(4, 4);
        let err = buf.to_encoded_bytes("image/avif", 0.9).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedEncoding(_)));

        let webp = buf.to_encoded_bytes("image/webp", 0.9).await.unwrap();
        assert_eq!(&webp[0..4], b"RIFF");
    }

    #[test]
    fn quality_percent_maps_unit_range() {
        assert_eq!(quality_percent(0.0), 1);
        assert_eq!(quality_percent(0.75), 75);
        assert_eq!(quality_percent(1.0), 100);
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#ff8000"), Some([255, 128, 0, 255]));
        assert_eq!(parse_hex_color("#00000080"), Some([0, 0, 0, 128]));
        assert_eq!(parse_hex_color("ff8000"), None);
        assert_eq!(parse_hex_color("#ff80"), None);
    }
}
