//! Subcommands and the helpers they share.

pub mod analyze;
pub mod batch;
pub mod config;
pub mod import;
pub mod process;
pub mod taxes;

use std::path::{Path, PathBuf};

use fiscal_core::FiscalConfig;
use tracing::debug;

/// `<platform config dir>/fiscal/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fiscal")
        .join("config.json")
}

/// The explicit `--config` path, or the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration; a missing default file means defaults, a missing explicit file is an error.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<FiscalConfig> {
    if let Some(path) = explicit {
        return FiscalConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e));
    }

    let path = default_config_path();
    if path.exists() {
        debug!("Using configuration at {}", path.display());
        Ok(FiscalConfig::from_file(&path)?)
    } else {
        Ok(FiscalConfig::default())
    }
}
