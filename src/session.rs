use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::ImagingError;
use crate::processing;
use crate::raster::RasterBuffer;
use crate::state::AdjustmentParams;

/// One uploaded file: a display label plus its encoded bytes.
#[derive(Debug, Clone)]
pub struct Upload {
    pub label: String,
    pub bytes: Vec<u8>,
}

/// An upload that could not be decoded. The rest of the batch still loads.
#[derive(Debug)]
pub struct LoadFailure {
    pub label: String,
    pub error: ImagingError,
}

#[derive(Debug, Clone)]
/// Per-photo buffer slots.
pub struct PhotoEntry {
    label: String,
    original: RasterBuffer,
    working: RasterBuffer,
    preview: RasterBuffer,
}

impl PhotoEntry {
    fn new(label: String, decoded: RasterBuffer) -> Self {
        Self {
            label,
            original: decoded.clone(),
            working: decoded.clone(),
            preview: decoded,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The buffer as decoded and normalized. Never reassigned.
    pub fn original(&self) -> &RasterBuffer {
        &self.original
    }

    /// Last committed state.
    pub fn working(&self) -> &RasterBuffer {
        &self.working
    }

    /// Scratch result of the latest preview.
    pub fn preview(&self) -> &RasterBuffer {
        &self.preview
    }
}

/// Edit state for a batch of photos.
///
/// Each entry keeps its original, working, and preview buffers together, so
/// the three can never drift out of step. Indices past the end are caller
/// bugs and panic; failing adjustments return an error and change nothing.
#[derive(Debug, Default)]
pub struct EditSession {
    photos: Vec<PhotoEntry>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and normalizes every upload. Undecodable files are reported
    /// in the returned list and skipped.
    pub fn load(uploads: Vec<Upload>) -> (Self, Vec<LoadFailure>) {
        let mut session = Self::new();
        let failures = session.extend(uploads);
        (session, failures)
    }

    /// Adds more uploads to the end of the batch.
    pub fn extend(&mut self, uploads: Vec<Upload>) -> Vec<LoadFailure> {
        let mut failures = Vec::new();
        for upload in uploads {
            match RasterBuffer::decode(&upload.bytes) {
                Ok(decoded) => {
                    let normalized = decoded.normalized();
                    info!(
                        label = %upload.label,
                        width = normalized.width(),
                        height = normalized.height(),
                        "loaded photo"
                    );
                    self.photos.push(PhotoEntry::new(upload.label, normalized));
                }
                Err(error) => {
                    warn!(label = %upload.label, %error, "skipping undecodable upload");
                    failures.push(LoadFailure {
                        label: upload.label,
                        error,
                    });
                }
            }
        }
        failures
    }

    /// Adds an already decoded buffer.
    pub fn push(&mut self, label: impl Into<String>, buffer: RasterBuffer) -> usize {
        self.photos.push(PhotoEntry::new(label.into(), buffer.normalized()));
        self.photos.len() - 1
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn photos(&self) -> &[PhotoEntry] {
        &self.photos
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn photo(&self, index: usize) -> &PhotoEntry {
        self.check_index(index);
        &self.photos[index]
    }

    /// Recomputes the preview from the working buffer. Never touches
    /// `working`, and never builds on a previous preview.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn preview(
        &mut self,
        index: usize,
        params: &AdjustmentParams,
    ) -> Result<&RasterBuffer, ImagingError> {
        self.check_index(index);
        let entry = &mut self.photos[index];
        entry.preview = processing::apply(&entry.working, params)?;
        Ok(&entry.preview)
    }

    /// Applies `params` to the working buffer and keeps the result.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn commit(
        &mut self,
        index: usize,
        params: &AdjustmentParams,
    ) -> Result<&RasterBuffer, ImagingError> {
        self.check_index(index);
        let entry = &mut self.photos[index];
        let next = processing::apply(&entry.working, params)?;
        info!(label = %entry.label, index, "committed adjustments");
        entry.preview = next.clone();
        entry.working = next;
        Ok(&entry.working)
    }

    /// Discards every commit on one photo.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn reset_to_original(&mut self, index: usize) {
        self.check_index(index);
        let entry = &mut self.photos[index];
        entry.working = entry.original.clone();
        entry.preview = entry.original.clone();
        info!(label = %entry.label, index, "reset to original");
    }

    /// Sets every photo (except `exclude`) to `params` applied to its own
    /// original. Either all photos are updated or none are.
    ///
    /// # Panics
    ///
    /// Panics if `exclude` is given and out of range.
    pub fn apply_to_all(
        &mut self,
        params: &AdjustmentParams,
        exclude: Option<usize>,
    ) -> Result<usize, ImagingError> {
        if let Some(skip) = exclude {
            self.check_index(skip);
        }
        let results: Vec<(usize, RasterBuffer)> = self
            .photos
            .par_iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(i, entry)| processing::apply(&entry.original, params).map(|out| (i, out)))
            .collect::<Result<_, _>>()?;

        let updated = results.len();
        for (i, out) in results {
            let entry = &mut self.photos[i];
            entry.preview = out.clone();
            entry.working = out;
        }
        info!(updated, excluded = ?exclude, "applied adjustments to batch");
        Ok(updated)
    }

    /// Drops every photo.
    pub fn clear(&mut self) {
        self.photos.clear();
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.photos.len(),
            "photo index {index} out of range for a session of {}",
            self.photos.len()
        );
    }
}
