use tracing::{info, warn};

use crate::background::{self, BackgroundRemover, NotAvailable};
use crate::generation::{AgeEstimator, ImageGenerator, estimate_age, generate_or_original};
use crate::raster::RasterBuffer;
use crate::session::PhotoEntry;
use crate::style::{
    AgeDirective, BackgroundSource, Enhancements, PromptDirectives, StyleRequestBuilder,
    StyleVariation,
};

/// Settings shared by every photo × variation call in one run.
#[derive(Debug, Clone, Default)]
pub struct StyleJob {
    pub variations: Vec<StyleVariation>,
    pub enhancements: Enhancements,
    pub age: Option<AgeDirective>,
    pub background: Option<RasterBuffer>,
    pub reference: Option<RasterBuffer>,
    pub directives: PromptDirectives,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress<'a> {
    /// 1-based position of the call about to run.
    pub current: usize,
    pub total: usize,
    pub label: &'a str,
    pub variation: &'a str,
}

/// One finished call. `image` is the photo's working buffer when
/// `generated` is false.
#[derive(Debug, Clone)]
pub struct StyleOutcome {
    pub label: String,
    pub variation: String,
    pub image: RasterBuffer,
    pub warning: Option<String>,
    pub generated: bool,
}

impl StyleOutcome {
    /// Download name, before archive sanitizing.
    pub fn export_name(&self) -> String {
        format!("photo-{}-{}", self.variation, self.label)
    }
}

/// Sequential photo × variation runner over the remote generator.
pub struct StyleBatch<'a> {
    generator: &'a dyn ImageGenerator,
    estimator: Option<&'a dyn AgeEstimator>,
    remover: &'a dyn BackgroundRemover,
}

impl<'a> StyleBatch<'a> {
    pub fn new(generator: &'a dyn ImageGenerator) -> Self {
        Self {
            generator,
            estimator: None,
            remover: &NotAvailable,
        }
    }

    pub fn with_estimator(mut self, estimator: &'a dyn AgeEstimator) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn with_remover(mut self, remover: &'a dyn BackgroundRemover) -> Self {
        self.remover = remover;
        self
    }

    /// Styles each photo's working buffer with every variation in `job`.
    /// Failed calls still yield an outcome, carrying a warning.
    pub fn run(
        &self,
        photos: &[PhotoEntry],
        job: &StyleJob,
        mut on_progress: impl FnMut(&Progress<'_>),
    ) -> Vec<StyleOutcome> {
        let total = photos.len() * job.variations.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut current = 0;

        for photo in photos {
            if job.variations.is_empty() {
                break;
            }
            let age = self.resolve_age(photo, job);
            let (primary, background) = self.prepare_background(photo, job);

            for variation in &job.variations {
                current += 1;
                let progress = Progress {
                    current,
                    total,
                    label: photo.label(),
                    variation: variation.name,
                };
                info!(current, total, label = photo.label(), variation = variation.name, "styling");
                on_progress(&progress);

                let request = StyleRequestBuilder::new(variation)
                    .enhancements(job.enhancements.clone())
                    .age(age)
                    .background(background.clone())
                    .reference(job.reference.clone())
                    .directives(job.directives)
                    .build();
                let result = generate_or_original(self.generator, &request, &primary);
                outcomes.push(StyleOutcome {
                    label: photo.label().to_string(),
                    variation: variation.name.to_string(),
                    image: if result.generated {
                        result.image
                    } else {
                        photo.working().clone()
                    },
                    warning: result.warning,
                    generated: result.generated,
                });
            }
        }
        outcomes
    }

    fn resolve_age(&self, photo: &PhotoEntry, job: &StyleJob) -> Option<AgeDirective> {
        match (job.age, self.estimator) {
            (Some(AgeDirective::Preserve { detected: None }), Some(estimator))
                if job.directives.age =>
            {
                let detected = estimate_age(estimator, photo.working());
                info!(label = photo.label(), ?detected, "estimated age");
                Some(AgeDirective::Preserve { detected })
            }
            (age, _) => age,
        }
    }

    /// Composites locally when a remover is wired in; otherwise the
    /// background rides along as the second image.
    fn prepare_background(
        &self,
        photo: &PhotoEntry,
        job: &StyleJob,
    ) -> (RasterBuffer, Option<BackgroundSource>) {
        let working = photo.working();
        let Some(bg) = &job.background else {
            return (working.clone(), None);
        };
        if self.remover.is_available() {
            let composited = self
                .remover
                .remove(working)
                .and_then(|cutout| background::composite(&cutout, bg));
            match composited {
                Ok(image) => return (image, Some(BackgroundSource::Composited)),
                Err(error) => {
                    warn!(label = photo.label(), %error, "local background swap failed; sending background to generator")
                }
            }
        }
        (working.clone(), Some(BackgroundSource::Supplied(bg.clone())))
    }
}
