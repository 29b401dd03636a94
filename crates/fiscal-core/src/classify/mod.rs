//! Document classification.
//!
//! Structured trees are classified by their wrapper elements. Visual inputs
//! are sent to the oracle with a closed vocabulary, and the reply is mapped
//! back onto [`DocumentType`] with an ordered substring cascade: the first
//! matching rule wins.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::OracleError;
use crate::models::document::{Classification, DocumentKind, DocumentType, InputFormat};
use crate::normalize::NormalizedInput;
use crate::oracle::{char_prefix, Oracle, OracleRequest};

/// Classifies normalized inputs.
pub struct Classifier {
    oracle: Option<Arc<dyn Oracle>>,
    text_limit: usize,
    max_tokens: u32,
    temperature: f32,
}

impl Classifier {
    /// Create a classifier. Without an oracle, visual inputs classify as failed.
    pub fn new(oracle: Option<Arc<dyn Oracle>>) -> Self {
        Self {
            oracle,
            text_limit: 1000,
            max_tokens: 50,
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

    /// Classify an input. Never fails: oracle problems become [`DocumentKind::Failed`].
    pub fn classify(&self, input: &NormalizedInput) -> Classification {
        match input {
            NormalizedInput::Structured { tree } => {
                let doc_type = classify_structured(tree);
                debug!("Structured input classified as {}", doc_type);
                Classification::new(InputFormat::Structured, DocumentKind::Known(doc_type))
            }
            NormalizedInput::Visual { text, image } => {
                let kind = match self.ask_oracle(text, image.clone()) {
                    Ok(reply) => {
                        let kind = match_reply(&reply);
                        debug!("Oracle replied {:?} -> {}", reply.trim(), kind);
                        kind
                    }
                    Err(e) => {
                        warn!("Classification failed: {}", e);
                        DocumentKind::Failed(e.to_string())
                    }
                };
                Classification::new(InputFormat::Visual, kind)
            }
        }
    }

    fn ask_oracle(&self, text: &str, image: Option<Vec<u8>>) -> Result<String, OracleError> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| OracleError::NotConfigured("no oracle available".to_string()))?;
        let request = OracleRequest::new(classification_prompt(text, self.text_limit), self.max_tokens)
            .with_image(image)
            .with_temperature(self.temperature);
        oracle.complete(&request)
    }
}

/// Classify a structured tree by its top-level wrapper elements.
pub fn classify_structured(tree: &Value) -> DocumentType {
    let has_key = |key: &str| tree.get(key).is_some();

    if has_key("nfeProc") || has_key("NFe") {
        DocumentType::InvoiceElectronic
    } else if has_key("cteProc") || has_key("CTe") {
        DocumentType::TransportInvoice
    } else if tree.to_string().to_lowercase().contains("nfse") {
        DocumentType::ServiceInvoice
    } else {
        DocumentType::GenericXml
    }
}

/// Map a free-text oracle reply onto the vocabulary.
pub fn match_reply(reply: &str) -> DocumentKind {
    let trimmed = reply.trim();
    let lower = trimmed.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    let doc_type = if has("nfe") && !has("nfce") {
        DocumentType::InvoiceElectronic
    } else if has("nfce") || has("consumidor") {
        DocumentType::InvoiceConsumer
    } else if has("sat") {
        DocumentType::SatReceipt
    } else if has("cte") || has("transporte") {
        DocumentType::TransportInvoice
    } else if has("nfse") || has("serviço") || has("servico") {
        DocumentType::ServiceInvoice
    } else if has("cupom") {
        DocumentType::FiscalReceipt
    } else if has("outro") || has("other") {
        DocumentType::Other
    } else if lower.is_empty() {
        DocumentType::Unknown
    } else {
        return DocumentKind::Unmatched(trimmed.to_string());
    };
    DocumentKind::Known(doc_type)
}

/// Prompt listing the allowed answers and a bounded prefix of the OCR text.
pub fn classification_prompt(text: &str, text_limit: usize) -> String {
    format!(
        "Identify the type of this Brazilian fiscal document.\n\n\
         Allowed answers:\n\
         - NFe (Nota Fiscal Eletrônica)\n\
         - NFCe (Nota Fiscal ao Consumidor Eletrônica)\n\
         - SAT (Sistema Autenticador e Transmissor)\n\
         - CTe (Conhecimento de Transporte Eletrônico)\n\
         - NFSe (Nota Fiscal de Serviço Eletrônica)\n\
         - Cupom Fiscal\n\
         - Outro\n\n\
         Extracted text (OCR):\n{}\n\n\
         Answer with the document type only (NFe, NFCe, SAT, CTe, NFSe, Cupom Fiscal or Outro).",
        char_prefix(text, text_limit)
    )
}
