use std::fmt;

use serde::{Deserialize, Serialize};

use crate::raster::RasterBuffer;
use StyleCategory::{Artistic, Modern, Passport, Professional, Vintage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StyleCategory {
    Passport,
    Professional,
    Artistic,
    Vintage,
    Modern,
}

impl StyleCategory {
    pub const ALL: [StyleCategory; 5] = [
        StyleCategory::Passport,
        StyleCategory::Professional,
        StyleCategory::Artistic,
        StyleCategory::Vintage,
        StyleCategory::Modern,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StyleCategory::Passport => "passport",
            StyleCategory::Professional => "professional",
            StyleCategory::Artistic => "artistic",
            StyleCategory::Vintage => "vintage",
            StyleCategory::Modern => "modern",
        }
    }

    /// Extra composition instruction for categories with strict framing.
    fn framing(self) -> Option<&'static str> {
        match self {
            StyleCategory::Passport => Some(
                "Frame it as an official passport photo: head and shoulders centered, \
                 facing the camera directly, neutral expression with the mouth closed, \
                 eyes open and visible, plain off-white background, even lighting \
                 with no shadows on the face or background.",
            ),
            StyleCategory::Professional => Some(
                "Frame it as a head-and-shoulders portrait with the subject centered, \
                 shoulders square to the camera and eyes looking into the lens.",
            ),
            _ => None,
        }
    }
}

impl fmt::Display for StyleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named look within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleVariation {
    pub category: StyleCategory,
    pub name: &'static str,
    pub template: &'static str,
}

const fn variation(
    category: StyleCategory,
    name: &'static str,
    template: &'static str,
) -> StyleVariation {
    StyleVariation {
        category,
        name,
        template,
    }
}

pub const CATALOG: &[StyleVariation] = &[
    variation(Passport, "Standard Passport", "Generate a compliant passport photo of this person with true-to-life colors and sharp focus."),
    variation(Passport, "Visa Application", "Generate a visa application photo of this person with accurate skin tones and crisp detail."),
    variation(Passport, "ID Card", "Generate a clean identity card photo of this person with balanced exposure and natural color."),
    variation(Passport, "Driver License", "Generate a driver license photo of this person with neutral color and clear facial detail."),
    variation(Professional, "Corporate Executive", "Generate a professional corporate headshot of this person with studio lighting, formal business attire, a clean neutral background and sharp focus."),
    variation(Professional, "LinkedIn Profile", "Generate an approachable LinkedIn profile headshot of this person with soft key lighting, smart business casual clothing and a softly blurred office background."),
    variation(Professional, "Creative Professional", "Generate a modern creative-industry headshot of this person with smart casual clothing, a textured studio backdrop and confident relaxed posture."),
    variation(Professional, "Medical Professional", "Generate a trustworthy medical professional headshot of this person wearing a white coat, with bright even lighting and a clinical light background."),
    variation(Professional, "Academic Portrait", "Generate a dignified academic portrait of this person in smart attire with a library or bookshelf background and warm soft lighting."),
    variation(Artistic, "Oil Painting", "Generate an oil painting version of this photo with rich visible brushstrokes, deep colors and classical portrait composition."),
    variation(Artistic, "Watercolor", "Generate a watercolor painting version of this photo with soft bleeding edges, light washes of color and paper texture."),
    variation(Artistic, "Pencil Sketch", "Generate a detailed graphite pencil sketch of this photo with careful shading and cross-hatching on white paper."),
    variation(Artistic, "Pop Art", "Generate a bold pop art version of this photo with flat saturated colors, halftone dots and strong outlines."),
    variation(Artistic, "Fine Art Portrait", "Generate a fine art photography portrait of this photo with dramatic chiaroscuro lighting and a painterly dark background."),
    variation(Vintage, "1970s Film", "Generate a vintage 1970s film photo version of this image with warm faded tones, subtle film grain and soft contrast."),
    variation(Vintage, "Black and White Classic", "Generate a classic black and white portrait of this photo with deep blacks, silver highlights and fine grain."),
    variation(Vintage, "Sepia Heritage", "Generate an antique sepia-toned version of this photo resembling a late 19th century studio portrait."),
    variation(Vintage, "Polaroid", "Generate an instant-film Polaroid version of this photo with slightly washed-out colors, soft focus and a white frame."),
    variation(Vintage, "1950s Hollywood", "Generate a 1950s Hollywood glamour portrait of this photo with soft-focus glow, dramatic butterfly lighting and elegant styling."),
    variation(Modern, "Minimalist", "Generate a modern minimalist version of this photo with a clean uncluttered background, crisp detail and restrained muted colors."),
    variation(Modern, "Cinematic", "Generate a cinematic version of this photo with teal and orange color grading, shallow depth of field and widescreen mood."),
    variation(Modern, "Neon Urban", "Generate a modern urban night version of this photo with neon reflections, vivid magenta and cyan lighting and a city backdrop."),
    variation(Modern, "Editorial Fashion", "Generate a high-end fashion editorial version of this photo with bold styling, polished skin and magazine-quality lighting."),
    variation(Modern, "Bright and Airy", "Generate a bright and airy lifestyle version of this photo with high-key exposure, pastel tones and natural window light."),
];

/// All variations of one category, in catalog order.
pub fn variations(category: StyleCategory) -> impl Iterator<Item = &'static StyleVariation> {
    CATALOG.iter().filter(move |v| v.category == category)
}

/// Case-insensitive lookup by variation name.
pub fn find_variation(category: StyleCategory, name: &str) -> Option<&'static StyleVariation> {
    variations(category).find(|v| v.name.eq_ignore_ascii_case(name.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SkinTone {
    #[default]
    Natural,
    Lighter,
    Darker,
    Warmer,
    Cooler,
}

impl SkinTone {
    fn clause(self) -> Option<&'static str> {
        match self {
            SkinTone::Natural => None,
            SkinTone::Lighter => Some("lighten the skin tone slightly"),
            SkinTone::Darker => Some("deepen the skin tone slightly"),
            SkinTone::Warmer => Some("give the skin a slightly warmer tone"),
            SkinTone::Cooler => Some("give the skin a slightly cooler tone"),
        }
    }
}

/// Retouching toggles sent along with a style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enhancements {
    pub fill_hair: bool,
    pub remove_grey_hair: bool,
    pub smooth_skin: bool,
    pub skin_tone: SkinTone,
    pub whiten_teeth: bool,
    pub brighten_eyes: bool,
    pub improve_lighting: bool,
    pub boost_sharpness: bool,
}

impl Enhancements {
    fn clauses(&self) -> Vec<&'static str> {
        let toggles = [
            (self.fill_hair, "fill in thinning or sparse hair naturally"),
            (self.remove_grey_hair, "remove grey hair while keeping the natural hair color"),
            (self.smooth_skin, "smooth the skin while keeping natural texture"),
        ];
        let later = [
            (self.whiten_teeth, "whiten the teeth subtly"),
            (self.brighten_eyes, "brighten the eyes and make them look clear"),
            (self.improve_lighting, "improve the lighting on the face"),
            (self.boost_sharpness, "increase overall sharpness and detail"),
        ];
        let mut out: Vec<&'static str> = toggles
            .into_iter()
            .filter_map(|(on, text)| on.then_some(text))
            .collect();
        out.extend(self.skin_tone.clause());
        out.extend(later.into_iter().filter_map(|(on, text)| on.then_some(text)));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.clauses().is_empty()
    }
}

/// Inclusive age range for age transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeDirective {
    /// Keep the apparent age; `detected` is the estimate if one is known.
    Preserve { detected: Option<u32> },
    Target(AgeRange),
}

impl AgeDirective {
    fn clause(&self) -> String {
        match self {
            AgeDirective::Preserve { detected: Some(age) } => format!(
                "Keep the person's apparent age exactly as it is (about {age} years old); \
                 do not make them look younger or older."
            ),
            AgeDirective::Preserve { detected: None } => {
                "Keep the person's apparent age exactly as it is; do not make them look younger or older."
                    .to_string()
            }
            AgeDirective::Target(range) if range.min == range.max => format!(
                "Make the person appear {} years old while keeping their identity recognizable.",
                range.min
            ),
            AgeDirective::Target(range) => format!(
                "Make the person appear between {} and {} years old while keeping their identity recognizable.",
                range.min, range.max
            ),
        }
    }
}

/// How a custom background reaches the remote model.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundSource {
    /// Sent as the second image, to be swapped in remotely.
    Supplied(RasterBuffer),
    /// Already composited locally into the primary photo.
    Composited,
}

/// Which optional clauses get appended. Read from the `[prompt]` config table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptDirectives {
    pub framing: bool,
    pub age: bool,
    pub enhancements: bool,
    pub background: bool,
}

impl Default for PromptDirectives {
    fn default() -> Self {
        Self {
            framing: true,
            age: true,
            enhancements: true,
            background: true,
        }
    }
}

/// Everything sent to the generator for one photo and one variation.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRequest {
    pub category: StyleCategory,
    pub variation: String,
    pub template: String,
    pub enhancements: Enhancements,
    pub age: Option<AgeDirective>,
    pub background: Option<BackgroundSource>,
    pub reference: Option<RasterBuffer>,
    pub directives: PromptDirectives,
}

impl StyleRequest {
    /// The instruction text. Clause order is fixed: style body, framing, age,
    /// enhancements, background, so identical inputs give identical text.
    pub fn instruction(&self) -> String {
        let mut clauses = vec![self.template.trim().to_string()];
        if self.reference.is_some() && self.secondary_is_reference() {
            clauses.push("Match the overall look and styling of the second image.".to_string());
        }
        if self.directives.framing {
            if let Some(framing) = self.category.framing() {
                clauses.push(framing.to_string());
            }
        }
        if self.directives.age {
            if let Some(age) = &self.age {
                clauses.push(age.clause());
            }
        }
        if self.directives.enhancements {
            let list = self.enhancements.clauses();
            if !list.is_empty() {
                clauses.push(format!("Also {}.", list.join(", ")));
            }
        }
        if self.directives.background {
            match &self.background {
                Some(BackgroundSource::Supplied(_)) => clauses.push(
                    "Replace the background with the scene from the second image, matching \
                     its lighting and perspective so the person looks naturally placed in it."
                        .to_string(),
                ),
                Some(BackgroundSource::Composited) => clauses.push(
                    "Keep the current background and blend the edges of the person into it \
                     with consistent lighting."
                        .to_string(),
                ),
                None => {}
            }
        }
        clauses.join(" ")
    }

    /// The optional second image: a supplied background wins over a reference.
    pub fn secondary_image(&self) -> Option<&RasterBuffer> {
        if self.directives.background {
            if let Some(BackgroundSource::Supplied(bg)) = &self.background {
                return Some(bg);
            }
        }
        self.reference.as_ref()
    }

    fn secondary_is_reference(&self) -> bool {
        !(self.directives.background
            && matches!(self.background, Some(BackgroundSource::Supplied(_))))
    }
}

/// Assembles a [`StyleRequest`] from a catalog variation plus modifiers.
#[derive(Debug, Clone)]
pub struct StyleRequestBuilder {
    request: StyleRequest,
}

impl StyleRequestBuilder {
    pub fn new(variation: &StyleVariation) -> Self {
        Self::custom(variation.category, variation.name, variation.template)
    }

    /// A free-text template outside the catalog.
    pub fn custom(
        category: StyleCategory,
        name: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            request: StyleRequest {
                category,
                variation: name.into(),
                template: template.into(),
                enhancements: Enhancements::default(),
                age: None,
                background: None,
                reference: None,
                directives: PromptDirectives::default(),
            },
        }
    }

    pub fn enhancements(mut self, enhancements: Enhancements) -> Self {
        self.request.enhancements = enhancements;
        self
    }

    pub fn age(mut self, age: Option<AgeDirective>) -> Self {
        self.request.age = age;
        self
    }

    pub fn background(mut self, background: Option<BackgroundSource>) -> Self {
        self.request.background = background;
        self
    }

    pub fn reference(mut self, reference: Option<RasterBuffer>) -> Self {
        self.request.reference = reference;
        self
    }

    pub fn directives(mut self, directives: PromptDirectives) -> Self {
        self.request.directives = directives;
        self
    }

    pub fn build(self) -> StyleRequest {
        self.request
    }
}
