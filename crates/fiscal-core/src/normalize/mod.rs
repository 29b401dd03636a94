//! Input normalization.
//!
//! A raw file becomes either a structured tree (XML) or a text/image bundle
//! (PDF, scans, photos). Text extraction for visual formats is delegated to a
//! [`TextBackend`].

mod raster;
pub mod table;
pub mod xml;

#[cfg(feature = "native")]
mod pdf;

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::models::document::InputFormat;

pub use raster::{ImageBackend, OcrCommand};
pub use table::{ColumnMapping, ImportedRow, TableField, TableImport, TableImporter};
pub use xml::parse_xml;

#[cfg(feature = "native")]
pub use pdf::PdfBackend;

/// Extensions treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Canonical shape of one input document.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedInput {
    /// Machine-readable tree.
    Structured { tree: Value },
    /// OCR/embedded text with an optional page image (PNG bytes).
    Visual { text: String, image: Option<Vec<u8>> },
}

impl NormalizedInput {
    /// Parse an XML document into a structured input.
    pub fn from_xml(xml: &str) -> Result<Self, NormalizeError> {
        Ok(NormalizedInput::Structured {
            tree: parse_xml(xml)?,
        })
    }

    pub fn format(&self) -> InputFormat {
        match self {
            NormalizedInput::Structured { .. } => InputFormat::Structured,
            NormalizedInput::Visual { .. } => InputFormat::Visual,
        }
    }
}

/// Output contract of a text backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendOutput {
    pub success: bool,
    pub text: String,
    pub image: Option<Vec<u8>>,
    pub error: Option<String>,
}

impl BackendOutput {
    pub fn ok(text: impl Into<String>, image: Option<Vec<u8>>) -> Self {
        Self {
            success: true,
            text: text.into(),
            image,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Anything that turns a visual file into text and/or an image.
pub trait TextBackend: Send + Sync {
    fn extract(&self, path: &Path) -> BackendOutput;
}

/// Decide the input format from the file extension.
pub fn detect_format(path: &Path) -> Result<InputFormat, NormalizeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "xml" => Ok(InputFormat::Structured),
        "pdf" => Ok(InputFormat::Visual),
        e if IMAGE_EXTENSIONS.contains(&e) => Ok(InputFormat::Visual),
        _ => Err(NormalizeError::UnsupportedFormat(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        )),
    }
}

/// Converts raw files into [`NormalizedInput`].
pub struct Normalizer {
    backend: Box<dyn TextBackend>,
}

impl Normalizer {
    /// Create a normalizer that uses `backend` for visual formats.
    pub fn new(backend: impl TextBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Normalize a file.
    pub fn normalize(&self, path: &Path) -> Result<NormalizedInput, NormalizeError> {
        match detect_format(path)? {
            InputFormat::Structured => {
                let bytes = std::fs::read(path).map_err(|e| NormalizeError::Unreadable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                let xml = String::from_utf8_lossy(&bytes);
                let input = NormalizedInput::from_xml(&xml)?;
                debug!("Parsed XML tree from {}", path.display());
                Ok(input)
            }
            InputFormat::Visual => {
                if !path.is_file() {
                    return Err(NormalizeError::Unreadable {
                        path: path.display().to_string(),
                        reason: "file does not exist".to_string(),
                    });
                }
                let output = self.backend.extract(path);
                if !output.success {
                    let reason = output.error.unwrap_or_else(|| "unknown failure".to_string());
                    return Err(NormalizeError::Backend(reason));
                }
                if output.text.trim().is_empty() && output.image.is_none() {
                    warn!("No text or image recovered from {}", path.display());
                }
                debug!(
                    "Visual input: {} chars of text, image: {}",
                    output.text.len(),
                    output.image.is_some()
                );
                Ok(NormalizedInput::Visual {
                    text: output.text,
                    image: output.image,
                })
            }
        }
    }
}

/// Dispatches visual files to the PDF or image backend by extension.
#[cfg(feature = "native")]
pub struct FileBackend {
    pdf: PdfBackend,
    image: ImageBackend,
}

#[cfg(feature = "native")]
impl FileBackend {
    pub fn new(image: ImageBackend) -> Self {
        Self {
            pdf: PdfBackend::new().with_scan_backend(image.clone()),
            image,
        }
    }
}

#[cfg(feature = "native")]
impl Default for FileBackend {
    fn default() -> Self {
        Self::new(ImageBackend::default())
    }
}

#[cfg(feature = "native")]
impl TextBackend for FileBackend {
    fn extract(&self, path: &Path) -> BackendOutput {
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            self.pdf.extract(path)
        } else {
            self.image.extract(path)
        }
    }
}
