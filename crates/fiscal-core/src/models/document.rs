//! Document format and type classification models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical shape of the input once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Machine-readable tree (XML).
    Structured,
    /// OCR text and/or page image (PDF, scans, photos).
    Visual,
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFormat::Structured => write!(f, "structured"),
            InputFormat::Visual => write!(f, "visual"),
        }
    }
}

/// Fiscal document types recognized by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentType {
    /// Nota Fiscal Eletrônica.
    #[serde(rename = "NFe")]
    InvoiceElectronic,
    /// Nota Fiscal ao Consumidor Eletrônica.
    #[serde(rename = "NFCe")]
    InvoiceConsumer,
    /// Cupom fiscal emitted by a SAT authenticator.
    #[serde(rename = "SAT")]
    SatReceipt,
    /// Conhecimento de Transporte Eletrônico.
    #[serde(rename = "CTe")]
    TransportInvoice,
    /// Nota Fiscal de Serviço Eletrônica.
    #[serde(rename = "NFSe")]
    ServiceInvoice,
    /// Legacy cupom fiscal.
    #[serde(rename = "Cupom Fiscal")]
    FiscalReceipt,
    /// Structured fiscal XML with no known signature.
    #[serde(rename = "XML Fiscal")]
    GenericXml,
    /// A fiscal document outside the vocabulary.
    #[serde(rename = "Outro")]
    Other,
    /// Nothing could be determined.
    #[serde(rename = "Unknown")]
    Unknown,
}

impl DocumentType {
    /// All variants in declaration order.
    pub const ALL: [DocumentType; 9] = [
        DocumentType::InvoiceElectronic,
        DocumentType::InvoiceConsumer,
        DocumentType::SatReceipt,
        DocumentType::TransportInvoice,
        DocumentType::ServiceInvoice,
        DocumentType::FiscalReceipt,
        DocumentType::GenericXml,
        DocumentType::Other,
        DocumentType::Unknown,
    ];

    /// Short code used in configuration files and reports.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::InvoiceElectronic => "NFe",
            DocumentType::InvoiceConsumer => "NFCe",
            DocumentType::SatReceipt => "SAT",
            DocumentType::TransportInvoice => "CTe",
            DocumentType::ServiceInvoice => "NFSe",
            DocumentType::FiscalReceipt => "Cupom Fiscal",
            DocumentType::GenericXml => "XML Fiscal",
            DocumentType::Other => "Outro",
            DocumentType::Unknown => "Unknown",
        }
    }

    /// Parse a short code (case-insensitive).
    pub fn from_code(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.code().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of document-type classification.
///
/// Oracle failures are kept as data rather than raised, so that a triage view
/// always has something to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DocumentKind {
    /// A vocabulary term.
    Known(DocumentType),
    /// The oracle replied with something outside the vocabulary.
    Unmatched(String),
    /// Classification could not be performed; holds the diagnostic.
    Failed(String),
}

impl DocumentKind {
    /// The vocabulary term, if one was resolved.
    pub fn document_type(&self) -> Option<DocumentType> {
        match self {
            DocumentKind::Known(t) => Some(*t),
            _ => None,
        }
    }

    /// Whether classification soft-failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, DocumentKind::Failed(_))
    }

    /// Label as shown in reports.
    pub fn label(&self) -> String {
        match self {
            DocumentKind::Known(t) => t.code().to_string(),
            DocumentKind::Unmatched(raw) => raw.clone(),
            DocumentKind::Failed(reason) => format!("Classification error: {}", reason),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Immutable classification of a normalized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Structured or visual.
    pub input_format: InputFormat,
    /// Resolved fiscal document type.
    pub document_type: DocumentKind,
}

impl Classification {
    pub fn new(input_format: InputFormat, document_type: DocumentKind) -> Self {
        Self {
            input_format,
            document_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_codes() {
        assert_eq!(DocumentType::from_code("nfe"), Some(DocumentType::InvoiceElectronic));
        assert_eq!(DocumentType::from_code(" NFSe "), Some(DocumentType::ServiceInvoice));
        assert_eq!(DocumentType::from_code("cupom fiscal"), Some(DocumentType::FiscalReceipt));
        assert_eq!(DocumentType::from_code("boleto"), None);
    }

    #[test]
    fn test_document_type_serde_uses_codes() {
        let json = serde_json::to_string(&DocumentType::TransportInvoice).unwrap();
        assert_eq!(json, "\"CTe\"");
        let parsed: DocumentType = serde_json::from_str("\"XML Fiscal\"").unwrap();
        assert_eq!(parsed, DocumentType::GenericXml);
    }

    #[test]
    fn test_document_kind_label() {
        assert_eq!(DocumentKind::Known(DocumentType::InvoiceConsumer).label(), "NFCe");
        assert_eq!(DocumentKind::Unmatched("Boleto".into()).label(), "Boleto");
        assert!(DocumentKind::Failed("timeout".into()).label().contains("timeout"));
    }
}
