//! Canonical record extraction.
//!
//! Structured inputs are walked deterministically; visual inputs go through
//! the oracle with a prompt generated from the enabled taxes.

pub mod amounts;
pub mod prompt;
pub mod structured;
pub mod visual;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ExtractionError, OracleError};
use crate::models::document::{Classification, InputFormat};
use crate::models::record::FiscalRecord;
use crate::models::tax::TaxDefinition;
use crate::normalize::NormalizedInput;
use crate::oracle::{Oracle, OracleRequest};

pub use amounts::{format_brl_amount, parse_brl_amount};
pub use prompt::extraction_prompt;
pub use structured::extract_structured;
pub use visual::parse_reply;

/// Builds fiscal records from normalized inputs.
pub struct Extractor {
    oracle: Option<Arc<dyn Oracle>>,
    text_limit: usize,
    max_tokens: u32,
    temperature: f32,
}

impl Extractor {
    pub fn new(oracle: Option<Arc<dyn Oracle>>) -> Self {
        Self {
            oracle,
            text_limit: 2000,
            max_tokens: 2048,
            temperature: 0.3,
        }
    }

    /// Characters of text included in the prompt.
    pub fn with_text_limit(mut self, limit: usize) -> Self {
        self.text_limit = limit;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Extract a record whose tax map holds exactly the ids in `taxes`.
    pub fn extract(
        &self,
        input: &NormalizedInput,
        classification: &Classification,
        taxes: &[TaxDefinition],
    ) -> Result<FiscalRecord, ExtractionError> {
        if input.format() != classification.input_format {
            return Err(ExtractionError::FormatMismatch(format!(
                "input is {:?} but was classified as {:?}",
                input.format(),
                classification.input_format
            )));
        }

        let record = match input {
            NormalizedInput::Structured { tree } => extract_structured(tree, taxes)?,
            NormalizedInput::Visual { text, image } => self.extract_visual(text, image.clone(), taxes)?,
        };

        info!(
            "Extracted {} record: {} items, {} taxes",
            classification.document_type.label(),
            record.line_items.len(),
            record.taxes.len()
        );
        Ok(record)
    }

    fn extract_visual(
        &self,
        text: &str,
        image: Option<Vec<u8>>,
        taxes: &[TaxDefinition],
    ) -> Result<FiscalRecord, ExtractionError> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| OracleError::NotConfigured("no oracle available".to_string()))?;

        if image.is_none() && text.trim().is_empty() {
            warn!("Visual input has neither text nor image");
        }

        let request = OracleRequest::new(extraction_prompt(text, taxes, self.text_limit), self.max_tokens)
            .with_image(image)
            .with_temperature(self.temperature);
        let reply = oracle.complete(&request)?;
        debug!("Oracle reply: {} chars", reply.len());

        parse_reply(&reply, taxes)
    }
}
