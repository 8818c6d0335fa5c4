use image::DynamicImage;
use imageproc::filter::gaussian_blur_f32;

use crate::error::ImagingError;

use super::{blend, samples_mut, unexpected_layout};

const SIGMA: f32 = 1.0;

/// Unsharp-mask style sharpening: extrapolates away from a blurred copy.
/// Factors below 1 soften the image instead.
pub fn apply(img: DynamicImage, factor: f32) -> Result<DynamicImage, ImagingError> {
    let blurred = match &img {
        DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(gaussian_blur_f32(rgb, SIGMA)),
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(gaussian_blur_f32(gray, SIGMA)),
        other => {
            return Err(unexpected_layout(other));
        }
    };

    let mut out = img;
    for (o, b) in samples_mut(&mut out)?.iter_mut().zip(blurred.as_bytes()) {
        *o = blend(*b as f32, *o, factor);
    }
    Ok(out)
}
