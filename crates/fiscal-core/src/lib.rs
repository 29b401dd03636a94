//! Core library for Brazilian fiscal document processing.
//!
//! This crate provides:
//! - A dynamic tax schema registry backed by a JSON document
//! - Input normalization (XML trees, PDF text, images, CSV exports)
//! - Document classification and canonical record extraction
//! - Business-rule validation (CNPJ, CPF, access key, totals)
//! - The pipeline state machine, batch queue and aggregate analysis

pub mod analysis;
pub mod batch;
pub mod classify;
pub mod error;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod pipeline;
pub mod registry;
pub mod validation;

pub use analysis::{analyze, analyze_document, AggregateReport, DocumentSummary};
pub use batch::{BatchQueue, BatchRunner, BatchStats, QueueStatus};
pub use classify::Classifier;
pub use error::{FiscalError, Result};
pub use extract::Extractor;
pub use models::config::FiscalConfig;
pub use models::document::{Classification, DocumentKind, DocumentType, InputFormat};
pub use models::record::{FiscalRecord, Issuer, LineItem, Recipient, RecordSource, Totals};
pub use models::tax::{TaxDefinition, TaxScope};
pub use models::validation::{CheckValue, ValidationResult};
pub use normalize::{
    BackendOutput, ImageBackend, NormalizedInput, Normalizer, TableImporter, TextBackend,
};
pub use oracle::{Oracle, OracleRequest};
pub use pipeline::{Pipeline, PipelineState, PipelineStatus, ProcessedDocument};
pub use registry::TaxRegistry;

#[cfg(feature = "native")]
pub use normalize::{FileBackend, PdfBackend};
#[cfg(feature = "native")]
pub use oracle::HttpOracle;
