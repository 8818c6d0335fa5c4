use image::imageops::{self, FilterType};
use image::DynamicImage;

use crate::error::ImagingError;
use crate::raster::RasterBuffer;

/// Local subject cut-out. Chosen when the application is assembled; the
/// remote generator is the fallback when no remover is wired in.
pub trait BackgroundRemover {
    fn is_available(&self) -> bool;

    /// Returns an RGBA cut-out whose background pixels are transparent.
    fn remove(&self, photo: &RasterBuffer) -> Result<RasterBuffer, ImagingError>;
}

/// The remover used when no segmentation backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotAvailable;

impl BackgroundRemover for NotAvailable {
    fn is_available(&self) -> bool {
        false
    }

    fn remove(&self, _photo: &RasterBuffer) -> Result<RasterBuffer, ImagingError> {
        Err(ImagingError::BackgroundRemovalUnavailable)
    }
}

/// Places `cutout` over `background` stretched to the cut-out's size and
/// returns the flattened result.
pub fn composite(
    cutout: &RasterBuffer,
    background: &RasterBuffer,
) -> Result<RasterBuffer, ImagingError> {
    let (w, h) = cutout.dimensions();
    let mut canvas = background
        .image()
        .resize_exact(w, h, FilterType::Lanczos3)
        .to_rgba8();
    imageops::overlay(&mut canvas, &cutout.image().to_rgba8(), 0, 0);
    Ok(RasterBuffer::from_image(DynamicImage::ImageRgba8(canvas))?.normalized())
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, ImageBuffer, Rgba};

    use super::*;
    use crate::processing::test_images::solid;

    #[test]
    fn not_available_reports_and_refuses() {
        let remover = NotAvailable;
        assert!(!remover.is_available());
        let err = remover.remove(&solid(2, 2, [1, 1, 1])).unwrap_err();
        assert!(matches!(err, ImagingError::BackgroundRemovalUnavailable));
    }

    #[test]
    fn composite_shows_background_through_transparent_pixels() {
        let cutout = ImageBuffer::from_fn(4, 2, |x, _| {
            if x < 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let cutout = RasterBuffer::from_image(DynamicImage::ImageRgba8(cutout)).unwrap();
        let background = solid(8, 8, [0, 0, 255]);

        let out = composite(&cutout, &background).unwrap();
        assert_eq!(out.dimensions(), (4, 2));
        assert!(out.is_normalized());
        let rgb = out.image().to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(3, 1).0, [0, 0, 255]);
    }
}
