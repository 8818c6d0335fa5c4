use image::DynamicImage;

use crate::error::ImagingError;

use super::{blend, color, samples_mut, unexpected_layout};

/// Scales every sample toward black (factor < 1) or away from it (> 1).
pub fn brightness(mut img: DynamicImage, factor: f32) -> Result<DynamicImage, ImagingError> {
    for v in samples_mut(&mut img)? {
        *v = blend(0.0, *v, factor);
    }
    Ok(img)
}

/// Stretches samples around the image's mean luma.
pub fn contrast(mut img: DynamicImage, factor: f32) -> Result<DynamicImage, ImagingError> {
    let mean = (mean_luma(&img)? + 0.5).floor();
    for v in samples_mut(&mut img)? {
        *v = blend(mean, *v, factor);
    }
    Ok(img)
}

fn mean_luma(img: &DynamicImage) -> Result<f32, ImagingError> {
    let (sum, count) = match img {
        DynamicImage::ImageLuma8(buf) => (
            buf.as_raw().iter().map(|&v| v as u64).sum::<u64>(),
            buf.as_raw().len() as u64,
        ),
        DynamicImage::ImageRgb8(buf) => (
            buf.pixels()
                .map(|px| color::luma(px[0], px[1], px[2]) as u64)
                .sum::<u64>(),
            buf.width() as u64 * buf.height() as u64,
        ),
        other => {
            return Err(unexpected_layout(other));
        }
    };
    Ok(sum as f32 / count.max(1) as f32)
}
