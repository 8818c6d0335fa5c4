use std::collections::HashSet;
use std::io::{Cursor, Write};

use thiserror::Error;
use tracing::debug;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::ImagingError;
use crate::raster::RasterBuffer;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to encode {name}")]
    Encode {
        name: String,
        #[source]
        source: ImagingError,
    },
    #[error("failed to write archive")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to write archive entry")]
    Io(#[from] std::io::Error),
}

/// Bundles buffers into a deflate-compressed ZIP of JPEGs.
#[derive(Debug, Clone, Copy)]
pub struct ZipPackager {
    quality: u8,
}

impl Default for ZipPackager {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ZipPackager {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// One `<sanitized-name>.jpg` entry per input, in input order. Names
    /// that sanitize to the same entry get a numeric suffix.
    pub fn pack<'a, I>(&self, entries: I) -> Result<Vec<u8>, PackageError>
    where
        I: IntoIterator<Item = (&'a str, &'a RasterBuffer)>,
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut used = HashSet::new();

        for (name, buffer) in entries {
            let entry = unique_entry_name(&sanitize_name(name), &mut used);
            let jpeg = buffer
                .encode_jpeg(self.quality)
                .map_err(|source| PackageError::Encode {
                    name: name.to_string(),
                    source,
                })?;
            debug!(%entry, bytes = jpeg.len(), "adding archive entry");
            writer.start_file(entry, options)?;
            writer.write_all(&jpeg)?;
        }

        Ok(writer.finish()?.into_inner())
    }
}

/// Turns a label into a single safe path segment (no extension).
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

pub(crate) fn unique_entry_name(stem: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = format!("{stem}.jpg");
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{stem}-{n}.jpg");
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use image::{DynamicImage, RgbaImage};
    use zip::ZipArchive;

    use super::*;
    use crate::processing::test_images::{gradient, solid};

    fn entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn one_jpeg_per_input_with_sanitized_names() {
        let a = gradient(16, 8);
        let b = solid(4, 4, [10, 20, 30]);
        let zip = ZipPackager::default()
            .pack([("My Photo", &a), ("photo-Oil Painting-team/lead", &b)])
            .unwrap();

        let files = entries(zip);
        let names: Vec<_> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["My_Photo.jpg", "photo-Oil_Painting-team_lead.jpg"]);
        let decoded = image::load_from_memory(&files[0].1).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
        assert_eq!(
            image::guess_format(&files[1].1).unwrap(),
            image::ImageFormat::Jpeg
        );
    }

    #[test]
    fn empty_input_is_a_valid_empty_archive() {
        let empty: [(&str, &RasterBuffer); 0] = [];
        let zip = ZipPackager::default().pack(empty).unwrap();
        assert!(entries(zip).is_empty());
    }

    #[test]
    fn colliding_names_are_numbered() {
        let a = solid(2, 2, [0, 0, 0]);
        let zip = ZipPackager::default()
            .pack([("a b", &a), ("a/b", &a), ("a b", &a)])
            .unwrap();
        let names: Vec<_> = entries(zip).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a_b.jpg", "a_b-2.jpg", "a_b-3.jpg"]);
    }

    #[test]
    fn alpha_is_flattened_before_encoding() {
        let clear = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 0]));
        let buf = RasterBuffer::from_image(DynamicImage::ImageRgba8(clear)).unwrap();
        let zip = ZipPackager::new(100).pack([("ghost", &buf)]).unwrap();
        let (_, jpeg) = &entries(zip)[0];
        let rgb = image::load_from_memory(jpeg).unwrap().to_rgb8();
        assert!(rgb.pixels().all(|p| p.0.iter().all(|&c| c > 245)));
    }

    #[test]
    fn sanitize_handles_edge_cases() {
        assert_eq!(sanitize_name("  "), "image");
        assert_eq!(sanitize_name("../etc"), "_etc");
        assert_eq!(sanitize_name("C:\\x"), "C__x");
        assert_eq!(sanitize_name("Ünïcode ok"), "Ünïcode_ok");
    }
}
