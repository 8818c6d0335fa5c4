//! Remote image generation.
//!
//! The generator is an uncontrolled external model: instructions are hints,
//! not guarantees. Every failure here degrades to "keep the input photo and
//! tell the user why" instead of aborting the caller.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::raster::RasterBuffer;
use crate::style::StyleRequest;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_ERROR_CHARS: usize = 200;
const AGE_PROMPT: &str = "Estimate the age in years of the person in this photo. \
                          Reply with a single whole number only.";

/// What the generator sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationReply {
    Image(RasterBuffer),
    /// The model answered in prose instead of producing an image.
    Text(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API key not found; set GOOGLE_API_KEY or api_key in the config file")]
    MissingApiKey,
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    /// Sorts a remote failure by its status code and message text.
    pub fn classify(status: Option<u16>, message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        let message = truncate(message, MAX_ERROR_CHARS);
        if status == Some(429)
            || lower.contains("429")
            || lower.contains("quota")
            || lower.contains("rate limit")
            || lower.contains("resource_exhausted")
        {
            GenerationError::RateLimited(message)
        } else if status == Some(404) || lower.contains("404") || lower.contains("not found") {
            GenerationError::Unavailable(message)
        } else {
            GenerationError::Failed(message)
        }
    }

    /// Text suitable for showing to the person who asked for the image.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::MissingApiKey => self.to_string(),
            GenerationError::RateLimited(_) => {
                "The image service is busy or your quota is used up. Please try again later.".into()
            }
            GenerationError::Unavailable(_) => {
                "The image model is currently unavailable. Please try again later.".into()
            }
            GenerationError::Failed(message) => format!("Image generation failed: {message}"),
        }
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    let mut chars = message.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Produces a stylized image from an instruction and one or two photos.
pub trait ImageGenerator {
    fn generate(
        &self,
        instruction: &str,
        primary: &RasterBuffer,
        secondary: Option<&RasterBuffer>,
    ) -> Result<GenerationReply, GenerationError>;
}

/// Answers, in free text, how old the person in a photo looks.
pub trait AgeEstimator {
    fn describe_age(&self, photo: &RasterBuffer) -> Result<String, GenerationError>;
}

/// First integer in `text`, if any.
pub fn parse_age(text: &str) -> Option<u32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Asks the estimator for an age; any failure or unreadable answer is
/// treated as unknown.
pub fn estimate_age(estimator: &dyn AgeEstimator, photo: &RasterBuffer) -> Option<u32> {
    match estimator.describe_age(photo) {
        Ok(text) => {
            let age = parse_age(&text);
            debug!(?age, reply = %truncate(&text, 80), "age estimate");
            age
        }
        Err(error) => {
            warn!(%error, "age estimation failed; treating age as unknown");
            None
        }
    }
}

/// Result of one style call. `image` is the input photo whenever
/// `generated` is false.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub image: RasterBuffer,
    pub generated: bool,
    pub warning: Option<String>,
}

/// Runs `request` against `photo`, falling back to `photo` itself if the
/// generator errors or returns no image.
pub fn generate_or_original(
    generator: &dyn ImageGenerator,
    request: &StyleRequest,
    photo: &RasterBuffer,
) -> GenerationOutcome {
    let instruction = request.instruction();
    debug!(variation = %request.variation, %instruction, "requesting style");
    match generator.generate(&instruction, photo, request.secondary_image()) {
        Ok(GenerationReply::Image(image)) => GenerationOutcome {
            image: image.normalized(),
            generated: true,
            warning: None,
        },
        Ok(GenerationReply::Text(text)) => {
            warn!(variation = %request.variation, "generator returned text instead of an image");
            let mut warning = String::from("No image was generated; the original photo was kept.");
            if !text.trim().is_empty() {
                warning.push_str(" Model response: ");
                warning.push_str(&truncate(text.trim(), MAX_ERROR_CHARS));
            }
            GenerationOutcome {
                image: photo.clone(),
                generated: false,
                warning: Some(warning),
            }
        }
        Err(error) => {
            warn!(variation = %request.variation, %error, "generation failed; keeping original");
            GenerationOutcome {
                image: photo.clone(),
                generated: false,
                warning: Some(error.user_message()),
            }
        }
    }
}

/// Blocking client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_base: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(GenerationError::MissingApiKey)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::Failed(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    fn call(
        &self,
        instruction: &str,
        images: &[&RasterBuffer],
    ) -> Result<GenerateResponse, GenerationError> {
        let body = request_body(instruction, images)?;
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| GenerationError::classify(e.status().map(|s| s.as_u16()), &e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| GenerationError::Failed(e.to_string()))?;
        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|e| GenerationError::Failed(format!("unreadable reply: {e}")))
    }
}

impl ImageGenerator for GeminiClient {
    fn generate(
        &self,
        instruction: &str,
        primary: &RasterBuffer,
        secondary: Option<&RasterBuffer>,
    ) -> Result<GenerationReply, GenerationError> {
        let mut images = vec![primary];
        images.extend(secondary);
        let response = self.call(instruction, &images)?;
        reply_from_response(response)
    }
}

impl AgeEstimator for GeminiClient {
    fn describe_age(&self, photo: &RasterBuffer) -> Result<String, GenerationError> {
        match reply_from_response(self.call(AGE_PROMPT, &[photo])?)? {
            GenerationReply::Text(text) => Ok(text),
            GenerationReply::Image(_) => Err(GenerationError::Failed(
                "expected a text answer, got an image".into(),
            )),
        }
    }
}

/// Instruction first, then each image as an inline PNG part.
fn request_body(
    instruction: &str,
    images: &[&RasterBuffer],
) -> Result<serde_json::Value, GenerationError> {
    let mut parts = vec![serde_json::json!({ "text": instruction })];
    for image in images {
        let png = image
            .encode_png()
            .map_err(|e| GenerationError::Failed(e.to_string()))?;
        parts.push(serde_json::json!({
            "inline_data": { "mime_type": "image/png", "data": BASE64.encode(png) }
        }));
    }
    Ok(serde_json::json!({ "contents": [{ "parts": parts }] }))
}

/// Prefers the first inline image; otherwise joins any text parts.
fn reply_from_response(response: GenerateResponse) -> Result<GenerationReply, GenerationError> {
    let parts: Vec<Part> = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .collect();

    if let Some(inline) = parts.iter().find_map(|p| p.inline_data.as_ref()) {
        let bytes = BASE64
            .decode(inline.data.as_bytes())
            .map_err(|e| GenerationError::Failed(format!("bad image payload: {e}")))?;
        let image = RasterBuffer::decode(&bytes)
            .map_err(|e| GenerationError::Failed(e.to_string()))?;
        return Ok(GenerationReply::Image(image));
    }

    let text = parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n");
    Ok(GenerationReply::Text(text))
}

fn error_from_body(status: u16, body: &str) -> GenerationError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.status.is_empty() => {
            format!("{}: {}", envelope.error.status, envelope.error.message)
        }
        Ok(envelope) => envelope.error.message,
        Err(_) => body.to_string(),
    };
    GenerationError::classify(Some(status), &message)
}
