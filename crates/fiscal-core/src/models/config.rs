//! Configuration structures for the fiscal pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the fiscal pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalConfig {
    /// Tax schema registry configuration.
    pub registry: RegistryConfig,

    /// External oracle configuration.
    pub oracle: OracleConfig,

    /// Extraction configuration.
    pub extraction: ExtractionConfig,

    /// OCR command for image inputs.
    pub ocr: OcrConfig,

    /// Batch processing configuration.
    pub batch: BatchConfig,
}

/// Where the tax configuration document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path of the tax configuration JSON document.
    pub path: PathBuf,

    /// Author recorded in the change history.
    pub author: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/tax_config.json"),
            author: "user".to_string(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint used for visual input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Chat completions URL.
    pub endpoint: String,

    /// Model identifier.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Sampling temperature.
    pub temperature: f32,

    /// Token budget for classification replies.
    pub classification_max_tokens: u32,

    /// Token budget for extraction replies.
    pub extraction_max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: 0.3,
            classification_max_tokens: 50,
            extraction_max_tokens: 2048,
        }
    }
}

impl OracleConfig {
    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Prompt sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Characters of OCR text included in the classification prompt.
    pub classification_text_limit: usize,

    /// Characters of OCR text included in the extraction prompt.
    pub extraction_text_limit: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            classification_text_limit: 1000,
            extraction_text_limit: 2000,
        }
    }
}

/// External OCR command configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Run the OCR command for image inputs.
    pub enabled: bool,

    /// Executable name or path (invoked as `<command> <image> stdout -l <language>`).
    pub command: String,

    /// OCR language code.
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "tesseract".to_string(),
            language: "por".to_string(),
        }
    }
}

/// Batch queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of concurrent pipeline workers.
    pub workers: usize,

    /// Attempts before a failed item stops being retried.
    pub max_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_attempts: 3,
        }
    }
}

impl FiscalConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: FiscalConfig =
            serde_json::from_str(r#"{"batch": {"workers": 8}}"#).unwrap();
        assert_eq!(config.batch.workers, 8);
        assert_eq!(config.batch.max_attempts, 3);
        assert_eq!(config.oracle.classification_max_tokens, 50);
        assert_eq!(config.extraction.extraction_text_limit, 2000);
        assert_eq!(config.registry.author, "user");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = FiscalConfig::default();
        config.ocr.enabled = false;
        config.save(&path).unwrap();

        let loaded = FiscalConfig::from_file(&path).unwrap();
        assert!(!loaded.ocr.enabled);
        assert_eq!(loaded.oracle.timeout_secs, 60);
    }
}
