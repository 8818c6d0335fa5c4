use image::DynamicImage;
use imageproc::filter::median_filter;

use crate::error::ImagingError;
use crate::raster::RasterBuffer;
use crate::state::MAX_DENOISE;

use super::{require_normalized, unexpected_layout};

/// Runs a 3x3 median filter `strength` times; each pass reads the previous
/// pass's output.
pub fn denoise(buffer: &RasterBuffer, strength: u8) -> Result<RasterBuffer, ImagingError> {
    if strength > MAX_DENOISE {
        return Err(ImagingError::parameter("denoise strength", strength));
    }
    require_normalized(buffer)?;
    if strength == 0 {
        return Ok(buffer.clone());
    }

    let mut img = buffer.image().clone();
    for _ in 0..strength {
        img = match img {
            DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(median_filter(&rgb, 1, 1)),
            DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(median_filter(&gray, 1, 1)),
            other => return Err(unexpected_layout(&other)),
        };
    }
    RasterBuffer::from_image(img)
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageBuffer, Rgb};

    use super::denoise;
    use crate::processing::test_images::gradient;
    use crate::raster::RasterBuffer;

    #[test]
    fn zero_strength_is_identity() {
        let buf = gradient(9, 7);
        assert_eq!(denoise(&buf, 0).unwrap(), buf);
    }

    #[test]
    fn isolated_speck_is_removed() {
        let mut img = ImageBuffer::from_pixel(5, 5, Rgb([20u8, 20, 20]));
        img.put_pixel(2, 2, Rgb([255, 255, 255]));
        let buf = RasterBuffer::from_image(DynamicImage::ImageRgb8(img)).unwrap();
        let out = denoise(&buf, 1).unwrap();
        assert_eq!(out.image().to_rgb8().get_pixel(2, 2).0, [20, 20, 20]);
    }

    #[test]
    fn strength_n_equals_n_single_passes() {
        let buf = gradient(16, 12);
        let once = denoise(&buf, 1).unwrap();
        let twice = denoise(&once, 1).unwrap();
        let thrice = denoise(&twice, 1).unwrap();
        assert_eq!(denoise(&buf, 2).unwrap(), twice);
        assert_eq!(denoise(&buf, 3).unwrap(), thrice);
    }

    #[test]
    fn strength_above_three_is_rejected() {
        assert!(denoise(&gradient(4, 4), 4).is_err());
    }
}
