//! Data models shared across the pipeline.

pub mod config;
pub mod document;
pub mod record;
pub mod tax;
pub mod validation;
