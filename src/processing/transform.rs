use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma, Pixel, Rgb};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

use crate::error::ImagingError;
use crate::raster::RasterBuffer;
use crate::state::{AspectRatio, RESIZE_RANGE, ROTATE_RANGE, Upscale};

use super::{require_normalized, unexpected_layout};

/// Center-crops to the largest rectangle of the target aspect.
/// Wider-than-target images lose columns, taller ones lose rows.
pub fn crop_to_ratio(
    buffer: &RasterBuffer,
    target: Option<AspectRatio>,
) -> Result<RasterBuffer, ImagingError> {
    let Some(target) = target else {
        return Ok(buffer.clone());
    };
    let ratio = target.ratio()?;
    require_normalized(buffer)?;

    let (w, h) = buffer.dimensions();
    let (cw, ch) = crop_dimensions(w, h, ratio);
    if cw == 0 || ch == 0 {
        return Err(ImagingError::DegenerateCrop {
            ratio,
            width: w,
            height: h,
        });
    }
    if (cw, ch) == (w, h) {
        return Ok(buffer.clone());
    }
    let x = (w - cw) / 2;
    let y = (h - ch) / 2;
    RasterBuffer::from_image(buffer.image().crop_imm(x, y, cw, ch))
}

fn crop_dimensions(width: u32, height: u32, ratio: f32) -> (u32, u32) {
    let current = width as f64 / height as f64;
    let ratio = ratio as f64;
    if current > ratio {
        let cw = (height as f64 * ratio).round() as u32;
        (cw.min(width), height)
    } else {
        let ch = (width as f64 / ratio).round() as u32;
        (width, ch.min(height))
    }
}

/// Rotates clockwise by `degrees`, growing the canvas so no corner is lost.
/// Uncovered area is filled with white.
pub fn rotate(buffer: &RasterBuffer, degrees: f32) -> Result<RasterBuffer, ImagingError> {
    if !(ROTATE_RANGE.0..=ROTATE_RANGE.1).contains(&degrees) {
        return Err(ImagingError::parameter("rotation", degrees));
    }
    require_normalized(buffer)?;
    if degrees.abs() < 0.01 {
        return Ok(buffer.clone());
    }

    let img = buffer.image();
    let rotated = if (degrees - 90.0).abs() < 0.01 {
        img.rotate90()
    } else if (degrees + 90.0).abs() < 0.01 {
        img.rotate270()
    } else if (degrees.abs() - 180.0).abs() < 0.01 {
        img.rotate180()
    } else {
        let theta = degrees.to_radians();
        match img {
            DynamicImage::ImageRgb8(rgb) => {
                DynamicImage::ImageRgb8(rotate_expanded(rgb, theta, Rgb([255, 255, 255])))
            }
            DynamicImage::ImageLuma8(gray) => {
                DynamicImage::ImageLuma8(rotate_expanded(gray, theta, Luma([255])))
            }
            other => return Err(unexpected_layout(other)),
        }
    };
    RasterBuffer::from_image(rotated)
}

/// Canvas size that holds a `width`x`height` rectangle rotated by `theta`.
pub(crate) fn expanded_dimensions(width: u32, height: u32, theta: f32) -> (u32, u32) {
    let (sin, cos) = (theta as f64).sin_cos();
    let (w, h) = (width as f64, height as f64);
    let ew = w * cos.abs() + h * sin.abs();
    let eh = w * sin.abs() + h * cos.abs();
    // trim float noise before rounding up
    let fit = |v: f64| ((v - 1e-6).ceil() as u32).max(1);
    (fit(ew), fit(eh))
}

fn rotate_expanded<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    theta: f32,
    fill: P,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync + 'static,
{
    let (w, h) = src.dimensions();
    let (ew, eh) = expanded_dimensions(w, h, theta);
    // the working canvas must hold both the source and the rotated box
    let (cw, ch) = (w.max(ew), h.max(eh));
    let mut canvas = ImageBuffer::from_pixel(cw, ch, fill);
    imageops::overlay(&mut canvas, src, ((cw - w) / 2) as i64, ((ch - h) / 2) as i64);
    let rotated = rotate_about_center(&canvas, theta, Interpolation::Bilinear, fill);
    imageops::crop_imm(&rotated, (cw - ew) / 2, (ch - eh) / 2, ew, eh).to_image()
}

/// Scales both edges by `percent / 100` with Lanczos resampling.
///
/// Edges are floored, so halving then doubling only restores even sizes:
/// a 63 pixel edge comes back as 62.
pub fn resize(buffer: &RasterBuffer, percent: u32) -> Result<RasterBuffer, ImagingError> {
    if !(RESIZE_RANGE.0..=RESIZE_RANGE.1).contains(&percent) {
        return Err(ImagingError::parameter("resize percent", percent));
    }
    require_normalized(buffer)?;
    if percent == 100 {
        return Ok(buffer.clone());
    }
    let scale = |v: u32| ((v as u64 * percent as u64 / 100) as u32).max(1);
    resample(buffer, scale(buffer.width()), scale(buffer.height()))
}

/// Integer-multiple enlargement with the same Lanczos filter as [`resize`].
///
/// This is a plain resample, not super-resolution: the result is larger but
/// carries no more detail than its input.
pub fn upscale(buffer: &RasterBuffer, factor: Upscale) -> Result<RasterBuffer, ImagingError> {
    require_normalized(buffer)?;
    let k = factor.factor();
    if k == 1 {
        return Ok(buffer.clone());
    }
    resample(buffer, buffer.width() * k, buffer.height() * k)
}

fn resample(buffer: &RasterBuffer, width: u32, height: u32) -> Result<RasterBuffer, ImagingError> {
    RasterBuffer::from_image(
        buffer
            .image()
            .resize_exact(width, height, FilterType::Lanczos3),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::test_images::{gradient, gray, solid};

    #[test]
    fn no_ratio_is_identity() {
        let buf = gradient(30, 20);
        assert_eq!(crop_to_ratio(&buf, None).unwrap(), buf);
    }

    #[test]
    fn crop_hits_target_ratio_within_rounding() {
        let buf = gradient(403, 301);
        for (w, h) in [(1.0, 1.0), (16.0, 9.0), (9.0, 16.0), (4.0, 3.0), (35.0, 45.0), (3.0, 1.0)] {
            let out = crop_to_ratio(&buf, Some(AspectRatio::new(w, h))).unwrap();
            assert!(out.width() <= 403 && out.height() <= 301);
            let got = out.width() as f32 / out.height() as f32;
            let tolerance = 1.0 / out.height().min(out.width()) as f32 + 1e-3;
            assert!(
                (got - w / h).abs() <= tolerance * (w / h).max(1.0),
                "{w}:{h} gave {}x{}",
                out.width(),
                out.height()
            );
        }
    }

    #[test]
    fn wide_image_is_cropped_around_horizontal_center() {
        let buf = gradient(40, 10);
        let out = crop_to_ratio(&buf, Some(AspectRatio::new(1.0, 1.0))).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        let expected = buf.image().crop_imm(15, 0, 10, 10);
        assert_eq!(out.image(), &expected);
    }

    #[test]
    fn tall_image_is_cropped_around_vertical_center() {
        let buf = gradient(10, 40);
        let out = crop_to_ratio(&buf, Some(AspectRatio::new(2.0, 1.0))).unwrap();
        assert_eq!(out.dimensions(), (10, 5));
        assert_eq!(out.image(), &buf.image().crop_imm(0, 17, 10, 5));
    }

    #[test]
    fn extreme_ratio_on_tiny_image_is_degenerate() {
        let buf = gradient(2, 2);
        let err = crop_to_ratio(&buf, Some(AspectRatio::new(1.0, 100.0))).unwrap_err();
        assert!(matches!(err, ImagingError::DegenerateCrop { .. }));
    }

    #[test]
    fn non_positive_ratio_is_rejected() {
        let err = crop_to_ratio(&gradient(4, 4), Some(AspectRatio::new(0.0, 1.0))).unwrap_err();
        assert!(matches!(err, ImagingError::InvalidParameter { .. }));
    }

    #[test]
    fn zero_rotation_is_identity() {
        let buf = gradient(13, 7);
        assert_eq!(rotate(&buf, 0.0).unwrap(), buf);
    }

    #[test]
    fn quarter_turn_is_clockwise_and_swaps_edges() {
        let mut img = image::RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let buf = RasterBuffer::from_image(DynamicImage::ImageRgb8(img)).unwrap();
        let out = rotate(&buf, 90.0).unwrap();
        assert_eq!(out.dimensions(), (2, 3));
        // top-left moves to top-right under a clockwise turn
        assert_eq!(out.image().to_rgb8().get_pixel(1, 0).0, [255, 0, 0]);
    }

    #[test]
    fn arbitrary_rotation_expands_canvas_with_white_corners() {
        let buf = solid(40, 20, [0, 0, 0]);
        let out = rotate(&buf, 30.0).unwrap();
        let (ew, eh) = expanded_dimensions(40, 20, 30f32.to_radians());
        assert_eq!(out.dimensions(), (ew, eh));
        assert!(ew > 40 && eh > 20);
        let rgb = out.image().to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(ew / 2, eh / 2).0, [0, 0, 0]);
    }

    fn dark_pixels(buffer: &RasterBuffer) -> usize {
        buffer
            .image()
            .to_luma8()
            .pixels()
            .filter(|p| p.0[0] < 128)
            .count()
    }

    #[test]
    fn steep_rotations_keep_the_whole_subject() {
        let buf = solid(40, 20, [0, 0, 0]);
        let total = 40 * 20;
        for degrees in [60.0f32, 89.0, -120.0, 135.0] {
            let out = rotate(&buf, degrees).unwrap();
            assert_eq!(
                out.dimensions(),
                expanded_dimensions(40, 20, degrees.to_radians())
            );
            let dark = dark_pixels(&out);
            assert!(
                dark > total * 9 / 10,
                "{degrees} degrees kept {dark} of {total} dark pixels"
            );
        }
    }

    #[test]
    fn rotation_keeps_grayscale_mode() {
        let out = rotate(&gray(10, 6), -45.0).unwrap();
        assert!(out.is_normalized());
        assert_eq!(out.color_mode(), crate::raster::ColorMode::Grayscale);
    }

    #[test]
    fn rotation_outside_range_is_rejected() {
        assert!(rotate(&gradient(4, 4), 270.0).is_err());
    }

    #[test]
    fn hundred_percent_resize_is_identity() {
        let buf = gradient(21, 9);
        assert_eq!(resize(&buf, 100).unwrap(), buf);
    }

    #[test]
    fn half_then_double_restores_dimensions() {
        let buf = gradient(64, 48);
        let half = resize(&buf, 50).unwrap();
        assert_eq!(half.dimensions(), (32, 24));
        assert_eq!(resize(&half, 200).unwrap().dimensions(), (64, 48));
    }

    #[test]
    fn odd_edges_floor_when_halved() {
        let half = resize(&gradient(63, 47), 50).unwrap();
        assert_eq!(half.dimensions(), (31, 23));
        assert_eq!(resize(&half, 200).unwrap().dimensions(), (62, 46));
    }

    #[test]
    fn resize_never_collapses_to_zero() {
        let out = resize(&gradient(1, 3), 25).unwrap();
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn upscale_multiplies_dimensions() {
        let buf = gradient(5, 3);
        assert_eq!(upscale(&buf, Upscale::X1).unwrap(), buf);
        assert_eq!(upscale(&buf, Upscale::X2).unwrap().dimensions(), (10, 6));
        assert_eq!(upscale(&buf, Upscale::X4).unwrap().dimensions(), (20, 12));
    }
}
