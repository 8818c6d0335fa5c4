use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, RgbImage};

use crate::error::ImagingError;

/// Channel layout of a [`RasterBuffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorMode {
    Grayscale,
    GrayscaleAlpha,
    Rgb,
    Rgba,
}

impl ColorMode {
    pub fn channels(self) -> usize {
        match self {
            ColorMode::Grayscale => 1,
            ColorMode::GrayscaleAlpha => 2,
            ColorMode::Rgb => 3,
            ColorMode::Rgba => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, ColorMode::GrayscaleAlpha | ColorMode::Rgba)
    }
}

/// A decoded image held in memory.
///
/// Buffers are treated as values: every adjustment returns a new buffer and
/// leaves its input alone, which is what keeps preview and commit apart.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterBuffer {
    image: DynamicImage,
}

impl RasterBuffer {
    /// Decodes uploaded bytes, sniffing the container format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImagingError> {
        if bytes.is_empty() {
            return Err(ImagingError::InvalidImage("empty upload".into()));
        }
        let image = image::load_from_memory(bytes).map_err(ImagingError::Decode)?;
        Self::from_image(image)
    }

    pub fn from_image(image: DynamicImage) -> Result<Self, ImagingError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ImagingError::InvalidImage(format!(
                "zero-area image {}x{}",
                image.width(),
                image.height()
            )));
        }
        Ok(Self { image })
    }

    /// Builds a buffer from 8-bit interleaved samples.
    pub fn from_raw(
        width: u32,
        height: u32,
        mode: ColorMode,
        data: Vec<u8>,
    ) -> Result<Self, ImagingError> {
        let expected = width as usize * height as usize * mode.channels();
        if data.len() != expected {
            return Err(ImagingError::InvalidImage(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                mode,
                expected,
                data.len()
            )));
        }
        let image = match mode {
            ColorMode::Grayscale => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            ColorMode::GrayscaleAlpha => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
            ColorMode::Rgb => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            ColorMode::Rgba => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        };
        let image = image.ok_or_else(|| ImagingError::InvalidImage("sample buffer too small".into()))?;
        Self::from_image(image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn color_mode(&self) -> ColorMode {
        let color = self.image.color();
        match (color.has_color(), color.has_alpha()) {
            (true, true) => ColorMode::Rgba,
            (true, false) => ColorMode::Rgb,
            (false, true) => ColorMode::GrayscaleAlpha,
            (false, false) => ColorMode::Grayscale,
        }
    }

    /// True when the buffer is 8-bit RGB or 8-bit grayscale.
    pub fn is_normalized(&self) -> bool {
        matches!(
            self.image,
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_)
        )
    }

    /// Converts to 8-bit RGB or grayscale, flattening any alpha onto white.
    pub fn normalized(&self) -> RasterBuffer {
        if self.is_normalized() {
            return self.clone();
        }
        let image = match self.color_mode() {
            ColorMode::Rgb => DynamicImage::ImageRgb8(self.image.to_rgb8()),
            ColorMode::Grayscale => DynamicImage::ImageLuma8(self.image.to_luma8()),
            ColorMode::Rgba => {
                let rgba = self.image.to_rgba8();
                let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                    let px = rgba.get_pixel(x, y).0;
                    image::Rgb([
                        over_white(px[0], px[3]),
                        over_white(px[1], px[3]),
                        over_white(px[2], px[3]),
                    ])
                });
                DynamicImage::ImageRgb8(rgb)
            }
            ColorMode::GrayscaleAlpha => {
                let la = self.image.to_luma_alpha8();
                let gray = GrayImage::from_fn(la.width(), la.height(), |x, y| {
                    let px = la.get_pixel(x, y).0;
                    image::Luma([over_white(px[0], px[1])])
                });
                DynamicImage::ImageLuma8(gray)
            }
        };
        RasterBuffer { image }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Interleaved samples in the buffer's native layout.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    /// JPEG bytes of the flattened image.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, ImagingError> {
        let flat = self.normalized();
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        flat.image
            .write_with_encoder(encoder)
            .map_err(ImagingError::Encode)?;
        Ok(out)
    }

    /// Lossless PNG bytes, alpha preserved.
    pub fn encode_png(&self) -> Result<Vec<u8>, ImagingError> {
        let mut cursor = Cursor::new(Vec::new());
        self.image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(ImagingError::Encode)?;
        Ok(cursor.into_inner())
    }
}

fn over_white(value: u8, alpha: u8) -> u8 {
    let a = alpha as f32 / 255.0;
    (value as f32 * a + 255.0 * (1.0 - a)).round() as u8
}
