//! Error types for the fiscal-core library.

use thiserror::Error;

/// Main error type for the fiscal library.
#[derive(Error, Debug)]
pub enum FiscalError {
    /// Tax schema configuration error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Input normalization error.
    #[error("input error: {0}")]
    Normalize(#[from] NormalizeError),

    /// External oracle error.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Record extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Image decoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors related to the tax schema registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The configuration document does not exist.
    #[error("tax configuration not found: {0}")]
    NotFound(String),

    /// The configuration document is not valid JSON for the expected shape.
    #[error("malformed tax configuration {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// A tax definition failed the sanity checks.
    #[error("invalid tax definition {id:?}: {reason}")]
    InvalidDefinition { id: String, reason: String },

    /// Backup or persistence failed.
    #[error("failed to persist tax configuration: {0}")]
    Persist(String),

    /// I/O error while reading the configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while turning a raw file into a normalized input.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// File extension is not one of the supported formats.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The file could not be read.
    #[error("unreadable file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// The XML document is malformed.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// The OCR/text backend reported a failure.
    #[error("text backend failed: {0}")]
    Backend(String),

    /// A table export could not be read.
    #[error("unreadable table: {0}")]
    Table(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Errors from the external oracle.
#[derive(Error, Debug)]
pub enum OracleError {
    /// No oracle is configured (e.g. missing API key).
    #[error("oracle not configured: {0}")]
    NotConfigured(String),

    /// The call exceeded the configured timeout.
    #[error("oracle call timed out after {0}s")]
    Timeout(u64),

    /// Transport or HTTP-level failure.
    #[error("oracle request failed: {0}")]
    Request(String),

    /// The oracle answered without any completion text.
    #[error("oracle returned an empty reply")]
    EmptyReply,
}

/// Errors related to fiscal record extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Failed to parse a value from the structured tree.
    #[error("failed to parse {field}: {value:?}")]
    Parse { field: String, value: String },

    /// The tree has an unexpected shape at a known path.
    #[error("unexpected structure at {path}: {reason}")]
    Structure { path: String, reason: String },

    /// An amount or sum left the representable decimal range.
    #[error("amount out of range at {0}")]
    Overflow(String),

    /// The oracle call failed.
    #[error("oracle failure: {0}")]
    Oracle(#[from] OracleError),

    /// The oracle replied but the reply is not a usable JSON object.
    #[error("unparseable oracle reply ({reason})")]
    UnparseableReply { reason: String, raw: String },

    /// The normalized input does not match the classified format.
    #[error("input format mismatch: {0}")]
    FormatMismatch(String),
}

impl ExtractionError {
    /// Raw oracle reply kept for operator inspection, if any.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            ExtractionError::UnparseableReply { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Result type for the fiscal library.
pub type Result<T> = std::result::Result<T, FiscalError>;
