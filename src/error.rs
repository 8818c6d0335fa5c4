use thiserror::Error;

use crate::raster::ColorMode;

/// Errors raised by the local pixel pipeline.
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("operation requires an RGB or grayscale buffer, got {0:?}")]
    UnsupportedColorMode(ColorMode),
    #[error("{name} out of range: {value}")]
    InvalidParameter { name: &'static str, value: String },
    #[error("crop to ratio {ratio} leaves no pixels of a {width}x{height} image")]
    DegenerateCrop { ratio: f32, width: u32, height: u32 },
    #[error("background removal is not available")]
    BackgroundRemovalUnavailable,
}

impl ImagingError {
    pub fn parameter(name: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
        }
    }
}
