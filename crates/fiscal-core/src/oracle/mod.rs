//! External oracle (LLM) boundary.
//!
//! The pipeline only ever sends a prompt, an optional image and a token budget,
//! and gets one text completion back. Everything the oracle says is untrusted.

#[cfg(feature = "native")]
mod http;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::OracleError;

#[cfg(feature = "native")]
pub use http::HttpOracle;

lazy_static! {
    static ref JSON_FENCE: Regex = Regex::new(r"(?s)```json\s*(.*?)(?:```|$)").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)(?:```|$)").unwrap();
}

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub prompt: String,
    /// PNG bytes attached to the prompt.
    pub image: Option<Vec<u8>>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            max_tokens,
            temperature: 0.3,
        }
    }

    pub fn with_image(mut self, image: Option<Vec<u8>>) -> Self {
        self.image = image;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A text completion service.
pub trait Oracle: Send + Sync {
    fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Remove Markdown code fences around a reply.
///
/// A ```` ```json ```` block wins over any other fenced block; without fences
/// the trimmed reply is returned.
pub fn strip_code_fences(reply: &str) -> &str {
    if let Some(body) = JSON_FENCE.captures(reply).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    if let Some(body) = ANY_FENCE.captures(reply).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    reply.trim()
}

/// The first `max_chars` characters of `text`.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
