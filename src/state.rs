use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImagingError;

pub const FACTOR_RANGE: (f32, f32) = (0.0, 3.0);
pub const ROTATE_RANGE: (f32, f32) = (-180.0, 180.0);
pub const RESIZE_RANGE: (u32, u32) = (25, 200);
pub const MAX_DENOISE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Target crop aspect, expressed as `width:height`.
pub struct AspectRatio {
    pub width: f32,
    pub height: f32,
}

impl AspectRatio {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Width over height. Fails for zero, negative, or non-finite terms.
    pub fn ratio(&self) -> Result<f32, ImagingError> {
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
        {
            return Err(ImagingError::parameter("crop ratio", self));
        }
        Ok(self.width / self.height)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = ImagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| ImagingError::parameter("crop ratio", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f32>()
                .map_err(|_| ImagingError::parameter("crop ratio", s))
        };
        let ratio = AspectRatio::new(parse(w)?, parse(h)?);
        ratio.ratio()?;
        Ok(ratio)
    }
}

/// Named crop presets offered next to free-form ratios.
pub const CROP_PRESETS: &[(&str, AspectRatio)] = &[
    ("Square (1:1)", AspectRatio::new(1.0, 1.0)),
    ("Portrait (3:4)", AspectRatio::new(3.0, 4.0)),
    ("Landscape (4:3)", AspectRatio::new(4.0, 3.0)),
    ("Widescreen (16:9)", AspectRatio::new(16.0, 9.0)),
    ("Story (9:16)", AspectRatio::new(9.0, 16.0)),
    ("Passport (35:45)", AspectRatio::new(35.0, 45.0)),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
/// Integer resample multiple. Not super-resolution: no detail is recovered.
pub enum Upscale {
    #[default]
    X1,
    X2,
    X4,
}

impl Upscale {
    pub fn factor(self) -> u32 {
        match self {
            Upscale::X1 => 1,
            Upscale::X2 => 2,
            Upscale::X4 => 4,
        }
    }
}

impl TryFrom<u8> for Upscale {
    type Error = ImagingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Upscale::X1),
            2 => Ok(Upscale::X2),
            4 => Ok(Upscale::X4),
            other => Err(ImagingError::parameter("upscale factor", other)),
        }
    }
}

impl From<Upscale> for u8 {
    fn from(value: Upscale) -> Self {
        value.factor() as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// One full set of local adjustments. `Default` is the neutral set.
pub struct AdjustmentParams {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub sharpness: f32,
    pub crop: Option<AspectRatio>,
    /// Degrees, positive reads clockwise.
    pub rotate: f32,
    pub resize_percent: u32,
    pub denoise: u8,
    pub upscale: Upscale,
}

impl Default for AdjustmentParams {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            sharpness: 1.0,
            crop: None,
            rotate: 0.0,
            resize_percent: 100,
            denoise: 0,
            upscale: Upscale::X1,
        }
    }
}

impl AdjustmentParams {
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ImagingError> {
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
            ("sharpness", self.sharpness),
        ] {
            if !(FACTOR_RANGE.0..=FACTOR_RANGE.1).contains(&value) {
                return Err(ImagingError::parameter(name, value));
            }
        }
        if let Some(crop) = &self.crop {
            crop.ratio()?;
        }
        if !(ROTATE_RANGE.0..=ROTATE_RANGE.1).contains(&self.rotate) {
            return Err(ImagingError::parameter("rotation", self.rotate));
        }
        if !(RESIZE_RANGE.0..=RESIZE_RANGE.1).contains(&self.resize_percent) {
            return Err(ImagingError::parameter("resize percent", self.resize_percent));
        }
        if self.denoise > MAX_DENOISE {
            return Err(ImagingError::parameter("denoise strength", self.denoise));
        }
        Ok(())
    }

    /// Loads a JSON preset.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&json)?;
        params.validate()?;
        Ok(params)
    }

    /// Saves the parameters as a pretty-printed JSON preset.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
