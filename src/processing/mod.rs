//! Local pixel adjustments.
//!
//! Every operation takes a normalized [`RasterBuffer`] (8-bit RGB or
//! grayscale) and returns a new one. Neutral parameters short-circuit to a
//! clone, so a fully neutral chain reproduces its input byte for byte.
//!
//! Chain order: brightness → contrast → saturation → sharpness → crop →
//! rotate → resize → denoise → upscale.

pub mod color;
pub mod exposure;
pub mod filters;
pub mod sharpness;
pub mod transform;

use image::DynamicImage;
use tracing::debug;

use crate::error::ImagingError;
use crate::raster::RasterBuffer;
use crate::state::AdjustmentParams;

pub use filters::denoise;
pub use transform::{crop_to_ratio, resize, rotate, upscale};

const NEUTRAL_EPSILON: f32 = 0.001;

pub(crate) fn is_neutral_factor(factor: f32) -> bool {
    (factor - 1.0).abs() < NEUTRAL_EPSILON
}

/// Interpolates from `degenerate` toward `value` by `factor`; 0 yields the
/// degenerate sample, 1 the original, above 1 extrapolates.
pub(crate) fn blend(degenerate: f32, value: u8, factor: f32) -> u8 {
    (degenerate + (value as f32 - degenerate) * factor)
        .round()
        .clamp(0.0, 255.0) as u8
}

pub(crate) fn require_normalized(buffer: &RasterBuffer) -> Result<(), ImagingError> {
    if buffer.is_normalized() {
        Ok(())
    } else {
        Err(ImagingError::UnsupportedColorMode(buffer.color_mode()))
    }
}

/// Mutable samples of a normalized image.
pub(crate) fn samples_mut(img: &mut DynamicImage) -> Result<&mut [u8], ImagingError> {
    let layout = unexpected_layout(img);
    match img {
        DynamicImage::ImageRgb8(buf) => Ok(&mut **buf),
        DynamicImage::ImageLuma8(buf) => Ok(&mut **buf),
        _ => Err(layout),
    }
}

pub(crate) fn unexpected_layout(img: &DynamicImage) -> ImagingError {
    ImagingError::InvalidImage(format!("unexpected pixel layout {:?}", img.color()))
}

/// Tone and color enhancement: brightness, contrast, saturation, sharpness.
///
/// A factor of 1.0 skips its step entirely.
pub fn enhance(
    buffer: &RasterBuffer,
    brightness: f32,
    contrast: f32,
    saturation: f32,
    sharpness: f32,
) -> Result<RasterBuffer, ImagingError> {
    require_normalized(buffer)?;
    let steps = [brightness, contrast, saturation, sharpness];
    if steps.iter().all(|f| is_neutral_factor(*f)) {
        return Ok(buffer.clone());
    }

    let mut img = buffer.image().clone();
    if !is_neutral_factor(brightness) {
        img = exposure::brightness(img, brightness)?;
    }
    if !is_neutral_factor(contrast) {
        img = exposure::contrast(img, contrast)?;
    }
    if !is_neutral_factor(saturation) {
        img = color::saturation(img, saturation)?;
    }
    if !is_neutral_factor(sharpness) {
        img = sharpness::apply(img, sharpness)?;
    }
    RasterBuffer::from_image(img)
}

/// Runs the whole adjustment chain over `buffer`.
pub fn apply(
    buffer: &RasterBuffer,
    params: &AdjustmentParams,
) -> Result<RasterBuffer, ImagingError> {
    params.validate()?;
    require_normalized(buffer)?;
    if params.is_neutral() {
        return Ok(buffer.clone());
    }

    let (w, h) = buffer.dimensions();
    let out = enhance(
        buffer,
        params.brightness,
        params.contrast,
        params.saturation,
        params.sharpness,
    )?;
    let out = crop_to_ratio(&out, params.crop)?;
    let out = rotate(&out, params.rotate)?;
    let out = resize(&out, params.resize_percent)?;
    let out = denoise(&out, params.denoise)?;
    let out = upscale(&out, params.upscale)?;
    debug!(
        from_width = w,
        from_height = h,
        width = out.width(),
        height = out.height(),
        "applied adjustment chain"
    );
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, GrayImage, ImageBuffer, Rgb};

    use crate::raster::RasterBuffer;

    /// Deterministic RGB gradient with some texture.
    pub fn gradient(width: u32, height: u32) -> RasterBuffer {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 255) / width.max(1)) as u8,
                ((y * 255) / height.max(1)) as u8,
                ((x * 7 + y * 13) % 256) as u8,
            ])
        });
        RasterBuffer::from_image(DynamicImage::ImageRgb8(img)).unwrap()
    }

    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RasterBuffer {
        let img = ImageBuffer::from_pixel(width, height, Rgb(rgb));
        RasterBuffer::from_image(DynamicImage::ImageRgb8(img)).unwrap()
    }

    pub fn gray(width: u32, height: u32) -> RasterBuffer {
        let img = GrayImage::from_fn(width, height, |x, y| image::Luma([((x + y) * 17 % 256) as u8]));
        RasterBuffer::from_image(DynamicImage::ImageLuma8(img)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageBuffer, Rgba};

    use super::test_images::{gradient, gray};
    use super::{apply, enhance};
    use crate::error::ImagingError;
    use crate::raster::RasterBuffer;
    use crate::state::{AdjustmentParams, AspectRatio, Upscale};

    #[test]
    fn neutral_chain_is_byte_identical() {
        for buf in [gradient(17, 11), gray(9, 14)] {
            let out = apply(&buf, &AdjustmentParams::default()).unwrap();
            assert_eq!(out.as_bytes(), buf.as_bytes());
            assert_eq!(out.dimensions(), buf.dimensions());
        }
    }

    #[test]
    fn neutral_factor_skips_step_exactly() {
        let buf = gradient(12, 12);
        let only_brightness = enhance(&buf, 1.3, 1.0, 1.0, 1.0).unwrap();
        let via_brightness_module = super::exposure::brightness(buf.image().clone(), 1.3).unwrap();
        assert_eq!(only_brightness.image(), &via_brightness_module);
    }

    #[test]
    fn chain_runs_geometry_after_tone() {
        let buf = gradient(40, 20);
        let params = AdjustmentParams {
            brightness: 1.2,
            crop: Some(AspectRatio::new(1.0, 1.0)),
            resize_percent: 50,
            upscale: Upscale::X2,
            ..AdjustmentParams::default()
        };
        let out = apply(&buf, &params).unwrap();
        assert_eq!(out.dimensions(), (20, 20));
    }

    #[test]
    fn invalid_params_are_rejected_before_any_work() {
        let params = AdjustmentParams {
            resize_percent: 500,
            ..AdjustmentParams::default()
        };
        let err = apply(&gradient(4, 4), &params).unwrap_err();
        assert!(matches!(err, ImagingError::InvalidParameter { .. }));
    }

    #[test]
    fn alpha_buffers_must_be_flattened_first() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(2, 2, Rgba([1, 2, 3, 4])));
        let buf = RasterBuffer::from_image(img).unwrap();
        let err = enhance(&buf, 1.5, 1.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, ImagingError::UnsupportedColorMode(_)));
        assert!(enhance(&buf.normalized(), 1.5, 1.0, 1.0, 1.0).is_ok());
    }
}
