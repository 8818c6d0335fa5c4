use image::DynamicImage;

use crate::error::ImagingError;

use super::{blend, unexpected_layout};

/// ITU-R 601 luma, integer weights.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

/// Moves each pixel toward (factor < 1) or away from (> 1) its own gray.
/// Grayscale images have nothing to saturate and pass through.
pub fn saturation(img: DynamicImage, factor: f32) -> Result<DynamicImage, ImagingError> {
    match img {
        DynamicImage::ImageLuma8(_) => Ok(img),
        DynamicImage::ImageRgb8(mut rgb) => {
            for px in rgb.pixels_mut() {
                let gray = luma(px[0], px[1], px[2]) as f32;
                for c in 0..3 {
                    px[c] = blend(gray, px[c], factor);
                }
            }
            Ok(DynamicImage::ImageRgb8(rgb))
        }
        other => Err(unexpected_layout(&other)),
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageBuffer, Luma, Rgb};

    use super::{luma, saturation};

    fn one_pixel(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(1, 1, Rgb(rgb)))
    }

    fn pixel_rgb(img: &DynamicImage) -> [u8; 3] {
        img.to_rgb8().get_pixel(0, 0).0
    }

    #[test]
    fn zero_saturation_is_grayscale() {
        let out = saturation(one_pixel([200, 40, 40]), 0.0).unwrap();
        let rgb = pixel_rgb(&out);
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
        assert_eq!(rgb[0], luma(200, 40, 40));
    }

    #[test]
    fn boosting_saturation_widens_channel_spread() {
        let out = saturation(one_pixel([150, 100, 100]), 1.5).unwrap();
        let rgb = pixel_rgb(&out);
        assert!(rgb[0] as i32 - rgb[1] as i32 > 50);
    }

    #[test]
    fn grayscale_passes_through() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(2, 2, Luma([77])));
        assert_eq!(saturation(img.clone(), 2.5).unwrap(), img);
    }

    #[test]
    fn luma_of_white_and_black() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
    }
}
