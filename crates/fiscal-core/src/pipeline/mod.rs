//! Document processing pipeline.
//!
//! A [`PipelineState`] moves through
//! `pending -> normalized -> classified -> extracted -> validated`, or into the
//! absorbing `error` state as soon as a step records a fatal error. Classification
//! never records errors; a failed oracle call is carried in the classification
//! itself and the pipeline keeps going.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::extract::Extractor;
use crate::models::document::Classification;
use crate::models::record::FiscalRecord;
use crate::models::validation::ValidationResult;
use crate::normalize::{NormalizedInput, Normalizer};
use crate::registry::TaxRegistry;
use crate::validation::validate;

/// Position of a document in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Normalized,
    Classified,
    Extracted,
    Validated,
    Error,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Normalized => "normalized",
            PipelineStatus::Classified => "classified",
            PipelineStatus::Extracted => "extracted",
            PipelineStatus::Validated => "validated",
            PipelineStatus::Error => "error",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Validated | PipelineStatus::Error)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulator threaded through the pipeline for one document.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub input: PathBuf,
    pub normalized: Option<NormalizedInput>,
    pub classification: Option<Classification>,
    pub record: Option<FiscalRecord>,
    pub validation: Option<ValidationResult>,
    pub status: PipelineStatus,
    pub errors: Vec<String>,
    /// Oracle reply that could not be parsed, kept for inspection.
    pub raw_reply: Option<String>,
}

impl PipelineState {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            normalized: None,
            classification: None,
            record: None,
            validation: None,
            status: PipelineStatus::Pending,
            errors: Vec::new(),
            raw_reply: None,
        }
    }

    fn fail(&mut self, error: String) {
        warn!("{}: {}", self.input.display(), error);
        self.errors.push(error);
        self.status = PipelineStatus::Error;
    }

    /// Persistable result of a completed run.
    pub fn outcome(&self) -> Option<ProcessedDocument> {
        if self.status != PipelineStatus::Validated {
            return None;
        }
        Some(ProcessedDocument {
            source: self.input.clone(),
            classification: self.classification.clone()?,
            record: self.record.clone()?,
            validation: self.validation.clone()?,
            processed_at: Utc::now(),
        })
    }

    /// First recorded error, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// What gets handed to storage after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub source: PathBuf,
    pub classification: Classification,
    pub record: FiscalRecord,
    pub validation: ValidationResult,
    pub processed_at: DateTime<Utc>,
}

/// Normalizer, classifier, extractor and validator wired to a tax registry.
pub struct Pipeline {
    registry: Arc<TaxRegistry>,
    normalizer: Normalizer,
    classifier: Classifier,
    extractor: Extractor,
}

impl Pipeline {
    pub fn new(
        registry: Arc<TaxRegistry>,
        normalizer: Normalizer,
        classifier: Classifier,
        extractor: Extractor,
    ) -> Self {
        Self {
            registry,
            normalizer,
            classifier,
            extractor,
        }
    }

    /// Build the native pipeline: file backends, HTTP oracle and the configured registry.
    ///
    /// A missing API key is not fatal; visual documents will then fail at extraction.
    #[cfg(feature = "native")]
    pub fn from_config(config: &crate::models::config::FiscalConfig) -> crate::Result<Self> {
        use crate::normalize::{FileBackend, ImageBackend};
        use crate::oracle::{HttpOracle, Oracle};

        let registry = TaxRegistry::open(&config.registry.path)?.with_author(config.registry.author.clone());

        let oracle: Option<Arc<dyn Oracle>> = match HttpOracle::from_config(&config.oracle) {
            Ok(oracle) => Some(Arc::new(oracle)),
            Err(e) => {
                warn!("Oracle unavailable, visual documents will fail: {}", e);
                None
            }
        };

        let backend = FileBackend::new(ImageBackend::from_config(&config.ocr));
        let classifier = Classifier::new(oracle.clone())
            .with_text_limit(config.extraction.classification_text_limit)
            .with_max_tokens(config.oracle.classification_max_tokens)
            .with_temperature(config.oracle.temperature);
        let extractor = Extractor::new(oracle)
            .with_text_limit(config.extraction.extraction_text_limit)
            .with_max_tokens(config.oracle.extraction_max_tokens)
            .with_temperature(config.oracle.temperature);

        Ok(Self::new(Arc::new(registry), Normalizer::new(backend), classifier, extractor))
    }

    pub fn registry(&self) -> &Arc<TaxRegistry> {
        &self.registry
    }

    /// Run a document through every step.
    pub fn run(&self, path: impl AsRef<Path>) -> PipelineState {
        let start = Instant::now();
        let mut state = PipelineState::new(path.as_ref());
        info!("Processing {}", state.input.display());

        while !state.status.is_terminal() {
            self.advance(&mut state);
        }

        info!(
            "Finished {} as {} in {:.2?}",
            state.input.display(),
            state.status,
            start.elapsed()
        );
        state
    }

    /// Perform the single transition allowed from the current status.
    ///
    /// Terminal states are left untouched.
    pub fn advance(&self, state: &mut PipelineState) -> PipelineStatus {
        match state.status {
            PipelineStatus::Pending => self.normalize_step(state),
            PipelineStatus::Normalized => self.classify_step(state),
            PipelineStatus::Classified => self.extract_step(state),
            PipelineStatus::Extracted => self.validate_step(state),
            PipelineStatus::Validated | PipelineStatus::Error => {}
        }
        state.status
    }

    fn normalize_step(&self, state: &mut PipelineState) {
        match self.normalizer.normalize(&state.input) {
            Ok(input) => {
                state.normalized = Some(input);
                state.status = PipelineStatus::Normalized;
            }
            Err(e) => state.fail(format!("Normalization failed: {}", e)),
        }
    }

    fn classify_step(&self, state: &mut PipelineState) {
        let Some(input) = state.normalized.as_ref() else {
            state.fail("Normalized input missing".to_string());
            return;
        };
        let classification = self.classifier.classify(input);
        if classification.document_type.is_failed() {
            warn!("Continuing with {}", classification.document_type);
        } else {
            debug!("Classified as {}", classification.document_type);
        }
        state.classification = Some(classification);
        state.status = PipelineStatus::Classified;
    }

    fn extract_step(&self, state: &mut PipelineState) {
        let (Some(input), Some(classification)) = (state.normalized.as_ref(), state.classification.as_ref())
        else {
            state.fail("Classification missing".to_string());
            return;
        };

        let taxes = match self.registry.enabled() {
            Ok(taxes) => taxes,
            Err(e) => {
                state.fail(format!("Tax configuration unavailable: {}", e));
                return;
            }
        };

        match self.extractor.extract(input, classification, &taxes) {
            Ok(record) => {
                state.record = Some(record);
                state.status = PipelineStatus::Extracted;
            }
            Err(e) => {
                state.raw_reply = e.raw_reply().map(str::to_string);
                state.fail(format!("Extraction failed: {}", e));
            }
        }
    }

    fn validate_step(&self, state: &mut PipelineState) {
        let Some(record) = state.record.as_ref() else {
            state.fail("Record missing".to_string());
            return;
        };
        let result = validate(record);
        if !result.is_valid {
            debug!("Record has {} validation errors", result.errors.len());
        }
        state.validation = Some(result);
        state.status = PipelineStatus::Validated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::models::document::{DocumentKind, DocumentType, InputFormat};
    use crate::normalize::{BackendOutput, TextBackend};
    use crate::oracle::testing::ScriptedOracle;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct FixedText(&'static str);

    impl TextBackend for FixedText {
        fn extract(&self, _path: &Path) -> BackendOutput {
            BackendOutput::ok(self.0, None)
        }
    }

    const XML: &str = r#"<nfeProc><NFe><infNFe Id="NFe35240111222333000181550010000001231000001238">
        <ide><nNF>123</nNF><serie>1</serie><dhEmi>2024-01-15T10:00:00-03:00</dhEmi></ide>
        <emit><CNPJ>11222333000181</CNPJ><xNome>Empresa Teste</xNome></emit>
        <dest><CPF>12345678909</CPF><xNome>Cliente</xNome></dest>
        <det nItem="1"><prod><cProd>1</cProd><xProd>Caneta</xProd><uCom>UN</uCom>
            <qCom>10</qCom><vUnCom>2.00</vUnCom><vProd>20.00</vProd></prod></det>
        <total><ICMSTot><vProd>20.00</vProd><vNF>20.00</vNF><vICMS>3.60</vICMS></ICMSTot></total>
    </infNFe></NFe></nfeProc>"#;

    fn setup(oracle: Option<Arc<ScriptedOracle>>) -> (TempDir, Pipeline) {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaxRegistry::init_default(dir.path().join("tax_config.json")).unwrap();
        let oracle = oracle.map(|o| o as Arc<dyn crate::oracle::Oracle>);
        let pipeline = Pipeline::new(
            Arc::new(registry),
            Normalizer::new(FixedText("CUPOM FISCAL ELETRONICO")),
            Classifier::new(oracle.clone()),
            Extractor::new(oracle),
        );
        (dir, pipeline)
    }

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_structured_document_validates() {
        let (dir, pipeline) = setup(None);
        let path = write(&dir, "nota.xml", XML.as_bytes());

        let state = pipeline.run(&path);
        assert_eq!(state.status, PipelineStatus::Validated);
        assert!(state.errors.is_empty());

        let doc = state.outcome().unwrap();
        assert_eq!(
            doc.classification.document_type,
            DocumentKind::Known(DocumentType::InvoiceElectronic)
        );
        let keys: Vec<&str> = doc.record.taxes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["cofins", "icms", "ipi", "iss", "pis"]);
        assert!(doc.validation.is_valid);
    }

    #[test]
    fn test_unsupported_file_halts_at_normalizer() {
        let (dir, pipeline) = setup(None);
        let path = write(&dir, "notes.txt", b"hello");

        let state = pipeline.run(&path);
        assert_eq!(state.status, PipelineStatus::Error);
        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].contains("unsupported file format"));
        assert!(state.normalized.is_none());
        assert!(state.classification.is_none());
        assert!(state.outcome().is_none());
    }

    #[test]
    fn test_step_by_step_transitions() {
        let (dir, pipeline) = setup(None);
        let path = write(&dir, "nota.xml", XML.as_bytes());
        let mut state = PipelineState::new(&path);

        assert_eq!(pipeline.advance(&mut state), PipelineStatus::Normalized);
        assert_eq!(pipeline.advance(&mut state), PipelineStatus::Classified);
        assert_eq!(pipeline.advance(&mut state), PipelineStatus::Extracted);
        assert!(state.validation.is_none());
        assert_eq!(pipeline.advance(&mut state), PipelineStatus::Validated);
        assert_eq!(pipeline.advance(&mut state), PipelineStatus::Validated);
    }

    #[test]
    fn test_visual_document_through_oracle() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok("NFCe".to_string()),
            Ok(r#"```json
{"issuer": {"tax_id": "11222333000181", "legal_name": "Mercado"},
 "items": [{"description": "Pão", "quantity": 2, "unit_price": 1.5, "line_total": 3.0}],
 "totals": {"products_total": 3.0, "grand_total": 3.0},
 "taxes": {"icms": 0.54}}
```"#
                .to_string()),
        ]));
        let (dir, pipeline) = setup(Some(oracle.clone()));
        let path = write(&dir, "cupom.png", b"not really a png");

        let state = pipeline.run(&path);
        assert_eq!(state.status, PipelineStatus::Validated);
        let classification = state.classification.as_ref().unwrap();
        assert_eq!(classification.input_format, InputFormat::Visual);
        assert_eq!(
            classification.document_type,
            DocumentKind::Known(DocumentType::InvoiceConsumer)
        );
        assert_eq!(state.record.as_ref().unwrap().line_items.len(), 1);
        assert_eq!(oracle.requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_classification_failure_is_soft() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Err(OracleError::Timeout(60)),
            Ok("{}".to_string()),
        ]));
        let (dir, pipeline) = setup(Some(oracle));
        let path = write(&dir, "scan.jpg", b"jpeg");

        let state = pipeline.run(&path);
        assert_eq!(state.status, PipelineStatus::Validated);
        let label = state.classification.unwrap().document_type.label();
        assert!(label.starts_with("Classification error:"));
    }

    #[test]
    fn test_unparseable_reply_halts_and_keeps_raw() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok("NFe".to_string()),
            Ok("I could not read this document".to_string()),
        ]));
        let (dir, pipeline) = setup(Some(oracle));
        let path = write(&dir, "scan.pdf", b"%PDF");

        let state = pipeline.run(&path);
        assert_eq!(state.status, PipelineStatus::Error);
        assert!(state.classification.is_some());
        assert!(state.record.is_none());
        assert_eq!(state.raw_reply.as_deref(), Some("I could not read this document"));
        assert!(state.error_message().unwrap().starts_with("Extraction failed"));
    }

    #[test]
    fn test_visual_without_oracle_fails_at_extraction() {
        let (dir, pipeline) = setup(None);
        let path = write(&dir, "scan.png", b"png");

        let state = pipeline.run(&path);
        assert_eq!(state.status, PipelineStatus::Error);
        assert!(state.classification.unwrap().document_type.is_failed());
        assert!(state.errors[0].contains("not configured"));
    }

    #[test]
    fn test_disabled_tax_leaves_the_record() {
        let (dir, pipeline) = setup(None);
        pipeline.registry().toggle("ipi").unwrap();
        let path = write(&dir, "nota.xml", XML.as_bytes());

        let record = pipeline.run(&path).record.unwrap();
        assert!(!record.taxes.contains_key("ipi"));
        assert_eq!(record.taxes.len(), 4);
    }
}
