//! Tax schema registry backed by a JSON document on disk.
//!
//! Every component that needs to know which taxes exist asks the registry
//! instead of hardcoding a list. Mutations follow a fixed sequence: back up the
//! current document, apply the change to a copy, append a history entry,
//! replace the primary file atomically, then drop the cached read view.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::models::document::DocumentType;
use crate::models::tax::{ChangeRecord, TaxConfigDocument, TaxDefinition};

type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Read-mostly view over the persisted tax configuration.
#[derive(Debug)]
pub struct TaxRegistry {
    path: PathBuf,
    author: String,
    cache: RwLock<Option<Arc<TaxConfigDocument>>>,
}

impl TaxRegistry {
    /// Open an existing configuration document.
    ///
    /// The document is loaded immediately so that a missing or malformed file
    /// is reported at startup.
    pub fn open(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let registry = Self {
            path: path.into(),
            author: "user".to_string(),
            cache: RwLock::new(None),
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Write the default configuration to `path` if nothing is there yet, then open it.
    pub fn init_default(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut doc = TaxConfigDocument::with_defaults();
            doc.metadata.last_updated = Some(Local::now().format("%Y-%m-%d").to_string());
            persist(&path, &doc)?;
            info!("Wrote default tax configuration to {}", path.display());
        }
        Self::open(path)
    }

    /// Author recorded in change-history entries.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Path of the primary configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the cached view; the next read goes to disk.
    pub fn invalidate(&self) {
        match self.cache.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Re-read the document from disk.
    pub fn reload(&self) -> RegistryResult<()> {
        let doc = Arc::new(load(&self.path)?);
        debug!(
            "Loaded {} tax definitions from {}",
            doc.taxes.len(),
            self.path.display()
        );
        match self.cache.write() {
            Ok(mut guard) => *guard = Some(doc),
            Err(poisoned) => *poisoned.into_inner() = Some(doc),
        }
        Ok(())
    }

    /// Current document, loading it if the cache is empty.
    pub fn snapshot(&self) -> RegistryResult<Arc<TaxConfigDocument>> {
        let cached = match self.cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(doc) = cached {
            return Ok(doc);
        }
        self.reload()?;
        let guard = match self.cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        guard.ok_or_else(|| RegistryError::NotFound(self.path.display().to_string()))
    }

    /// Tax definitions in document order.
    pub fn list(&self, enabled_only: bool) -> RegistryResult<Vec<TaxDefinition>> {
        Ok(self
            .snapshot()?
            .taxes
            .iter()
            .filter(|t| !enabled_only || t.enabled)
            .cloned()
            .collect())
    }

    /// Enabled tax definitions.
    pub fn enabled(&self) -> RegistryResult<Vec<TaxDefinition>> {
        self.list(true)
    }

    pub fn get(&self, id: &str) -> RegistryResult<Option<TaxDefinition>> {
        Ok(self.snapshot()?.find(id).cloned())
    }

    pub fn tax_ids(&self, enabled_only: bool) -> RegistryResult<Vec<String>> {
        Ok(self.list(enabled_only)?.into_iter().map(|t| t.id).collect())
    }

    /// Display name per tax id.
    pub fn names(&self, enabled_only: bool) -> RegistryResult<BTreeMap<String, String>> {
        Ok(self
            .list(enabled_only)?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect())
    }

    /// Chart colour per tax id.
    pub fn colors(&self, enabled_only: bool) -> RegistryResult<BTreeMap<String, String>> {
        Ok(self
            .list(enabled_only)?
            .into_iter()
            .map(|t| {
                let color = if t.color.is_empty() {
                    "#808080".to_string()
                } else {
                    t.color
                };
                (t.id, color)
            })
            .collect())
    }

    /// XML total fields of one tax, empty when the id is unknown.
    pub fn xml_fields_for(&self, id: &str) -> RegistryResult<Vec<String>> {
        Ok(self.get(id)?.map(|t| t.xml_fields).unwrap_or_default())
    }

    /// Enabled taxes that apply to the given document type.
    pub fn taxes_for_document_type(
        &self,
        doc_type: DocumentType,
    ) -> RegistryResult<Vec<TaxDefinition>> {
        Ok(self
            .enabled()?
            .into_iter()
            .filter(|t| t.applies_to_type(doc_type))
            .collect())
    }

    /// Change log, oldest first.
    pub fn history(&self) -> RegistryResult<Vec<ChangeRecord>> {
        Ok(self.snapshot()?.metadata.change_history.clone())
    }

    /// Add a new tax. Returns `false` if the id is already taken.
    pub fn add(&self, definition: TaxDefinition) -> RegistryResult<bool> {
        check_definition(&definition)?;
        let applied = self.mutate(|doc| {
            if doc.find(&definition.id).is_some() {
                return None;
            }
            let description = format!("Added tax {}", definition.id);
            doc.taxes.push(definition.clone());
            Some(((), description))
        })?;
        if applied.is_none() {
            warn!("Tax {} already exists", definition.id);
        }
        Ok(applied.is_some())
    }

    /// Replace the definition of `id`. Returns `false` if it does not exist.
    ///
    /// The stored id is always `id`, whatever the definition carries.
    pub fn update(&self, id: &str, mut definition: TaxDefinition) -> RegistryResult<bool> {
        definition.id = id.to_string();
        check_definition(&definition)?;
        let applied = self.mutate(|doc| {
            let slot = doc.taxes.iter_mut().find(|t| t.id == id)?;
            *slot = definition.clone();
            Some(((), format!("Updated tax {}", id)))
        })?;
        Ok(applied.is_some())
    }

    /// Remove a tax. Returns `false` if it does not exist.
    pub fn delete(&self, id: &str) -> RegistryResult<bool> {
        let applied = self.mutate(|doc| {
            let index = doc.taxes.iter().position(|t| t.id == id)?;
            doc.taxes.remove(index);
            Some(((), format!("Deleted tax {}", id)))
        })?;
        Ok(applied.is_some())
    }

    /// Flip the enabled flag. Returns the new state, or `None` if the id is unknown.
    pub fn toggle(&self, id: &str) -> RegistryResult<Option<bool>> {
        self.mutate(|doc| {
            let tax = doc.taxes.iter_mut().find(|t| t.id == id)?;
            tax.enabled = !tax.enabled;
            let state = if tax.enabled { "enabled" } else { "disabled" };
            Some((tax.enabled, format!("Tax {} {}", id, state)))
        })
    }

    /// Apply `change` to a fresh copy of the document and commit it.
    ///
    /// `change` returns `None` when it does not apply; nothing is written then.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut TaxConfigDocument) -> Option<(T, String)>,
    ) -> RegistryResult<Option<T>> {
        let mut doc = load(&self.path)?;
        let Some((value, description)) = change(&mut doc) else {
            return Ok(None);
        };

        let backup = backup(&self.path)?;
        debug!("Backed up tax configuration to {}", backup.display());

        let now = Local::now();
        doc.metadata.change_history.push(ChangeRecord {
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            description: description.clone(),
            author: self.author.clone(),
        });
        doc.metadata.last_updated = Some(now.format("%Y-%m-%d").to_string());

        persist(&self.path, &doc)?;
        self.invalidate();
        info!("{}", description);
        Ok(Some(value))
    }
}

fn load(path: &Path) -> RegistryResult<TaxConfigDocument> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RegistryError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content).map_err(|e| RegistryError::Malformed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Copy the primary file to `<primary>.backup_<timestamp>`.
fn backup(path: &Path) -> RegistryResult<PathBuf> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
    let mut target = PathBuf::from(format!("{}.backup_{}", path.display(), stamp));
    let mut n = 1;
    while target.exists() {
        target = PathBuf::from(format!("{}.backup_{}_{}", path.display(), stamp, n));
        n += 1;
    }
    std::fs::copy(path, &target)
        .map_err(|e| RegistryError::Persist(format!("backup failed: {}", e)))?;
    Ok(target)
}

/// Write the document to a sibling temp file and rename it over the primary.
fn persist(path: &Path, doc: &TaxConfigDocument) -> RegistryResult<()> {
    let content = serde_json::to_string_pretty(doc)
        .map_err(|e| RegistryError::Persist(e.to_string()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| RegistryError::Persist(e.to_string()))?;
    tmp.write_all(content.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| RegistryError::Persist(e.to_string()))?;
    tmp.persist(path)
        .map_err(|e| RegistryError::Persist(e.error.to_string()))?;
    Ok(())
}

fn check_definition(def: &TaxDefinition) -> RegistryResult<()> {
    let invalid = |reason: &str| RegistryError::InvalidDefinition {
        id: def.id.clone(),
        reason: reason.to_string(),
    };
    if def.id.is_empty()
        || !def
            .id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid("id must be a lowercase slug ([a-z0-9_]+)"));
    }
    if def.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if def.xml_fields.iter().all(|f| f.trim().is_empty()) {
        return Err(invalid("at least one XML field is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tax::TaxScope;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TaxRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaxRegistry::init_default(dir.path().join("tax_config.json")).unwrap();
        (dir, registry)
    }

    /// Backup files, oldest first.
    fn backups(dir: &TempDir) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("tax_config.json.backup_")
            })
            .map(|e| e.path())
            .collect();
        paths.sort();
        paths
    }

    fn read_document(path: &Path) -> TaxConfigDocument {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    fn ibs() -> TaxDefinition {
        TaxDefinition::new("ibs", "IBS", TaxScope::State, &["vIBS"])
            .with_full_name("Imposto sobre Bens e Serviços")
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TaxRegistry::open(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_open_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tax_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = TaxRegistry::open(&path).unwrap_err();
        assert!(matches!(err, RegistryError::Malformed { .. }));
    }

    #[test]
    fn test_default_configuration() {
        let (_dir, registry) = setup();
        assert_eq!(
            registry.tax_ids(true).unwrap(),
            vec!["icms", "ipi", "pis", "cofins", "iss"]
        );
        assert_eq!(registry.xml_fields_for("icms").unwrap(), vec!["vICMS", "vST"]);
        assert!(registry.xml_fields_for("nope").unwrap().is_empty());
        assert!(registry.history().unwrap().is_empty());
    }

    #[test]
    fn test_add_persists_with_backup_and_history() {
        let (dir, registry) = setup();
        let before = std::fs::read(registry.path()).unwrap();
        assert!(registry.add(ibs()).unwrap());

        let fresh = TaxRegistry::open(registry.path()).unwrap();
        assert!(fresh.get("ibs").unwrap().is_some());
        assert!(registry.get("ibs").unwrap().is_some());

        // The backup is the file as it was before the change
        let saved = backups(&dir);
        assert_eq!(saved.len(), 1);
        assert_eq!(std::fs::read(&saved[0]).unwrap(), before);
        let previous = read_document(&saved[0]);
        assert!(previous.find("ibs").is_none());
        assert!(previous.metadata.change_history.is_empty());

        let history = fresh.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].description, "Added tax ibs");
        assert_eq!(history[0].author, "user");
    }

    #[test]
    fn test_add_duplicate_is_rejected() {
        let (dir, registry) = setup();
        let dup = TaxDefinition::new("icms", "ICMS", TaxScope::State, &["vICMS"]);
        assert!(!registry.add(dup).unwrap());
        assert!(backups(&dir).is_empty());
        assert!(registry.history().unwrap().is_empty());
    }

    #[test]
    fn test_add_invalid_definition() {
        let (_dir, registry) = setup();
        let bad = TaxDefinition::new("Bad Id", "X", TaxScope::Federal, &["vX"]);
        assert!(matches!(
            registry.add(bad),
            Err(RegistryError::InvalidDefinition { .. })
        ));
        let empty_fields = TaxDefinition::new("x", "X", TaxScope::Federal, &[]);
        assert!(registry.add(empty_fields).is_err());
    }

    #[test]
    fn test_update_keeps_path_id() {
        let (dir, registry) = setup();
        let def = TaxDefinition::new("other", "ICMS-ST", TaxScope::State, &["vST"]);
        assert!(registry.update("icms", def).unwrap());

        let icms = registry.get("icms").unwrap().unwrap();
        assert_eq!(icms.name, "ICMS-ST");
        assert_eq!(icms.xml_fields, vec!["vST"]);
        assert!(registry.get("other").unwrap().is_none());
        let saved = backups(&dir);
        assert_eq!(saved.len(), 1);
        let previous = read_document(&saved[0]);
        assert_eq!(previous.find("icms").unwrap().name, "ICMS");
        assert_eq!(previous.find("icms").unwrap().xml_fields, vec!["vICMS", "vST"]);

        let absent = TaxDefinition::new("zzz", "Z", TaxScope::Federal, &["vZ"]);
        assert!(!registry.update("zzz", absent).unwrap());
        assert_eq!(registry.history().unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let (_dir, registry) = setup();
        assert!(registry.delete("ipi").unwrap());
        assert!(!registry.delete("ipi").unwrap());
        assert_eq!(registry.list(false).unwrap().len(), 4);
        assert_eq!(registry.history().unwrap().len(), 1);
    }

    #[test]
    fn test_toggle() {
        let (dir, registry) = setup();
        assert_eq!(registry.toggle("iss").unwrap(), Some(false));
        assert_eq!(registry.tax_ids(true).unwrap().len(), 4);
        assert_eq!(registry.tax_ids(false).unwrap().len(), 5);

        assert_eq!(registry.toggle("iss").unwrap(), Some(true));
        assert_eq!(registry.toggle("missing").unwrap(), None);
        assert_eq!(registry.history().unwrap().len(), 2);

        // Each backup holds the state just before its own toggle
        let saved = backups(&dir);
        assert_eq!(saved.len(), 2);
        assert!(read_document(&saved[0]).find("iss").unwrap().enabled);
        let middle = read_document(&saved[1]);
        assert!(!middle.find("iss").unwrap().enabled);
        assert_eq!(middle.metadata.change_history.len(), 1);
    }

    #[test]
    fn test_taxes_for_document_type() {
        let (_dir, registry) = setup();
        let ids: Vec<String> = registry
            .taxes_for_document_type(DocumentType::ServiceInvoice)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["pis", "cofins", "iss"]);

        registry.toggle("iss").unwrap();
        let ids = registry
            .taxes_for_document_type(DocumentType::ServiceInvoice)
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_unknown_metadata_survives_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tax_config.json");
        std::fs::write(
            &path,
            r#"{"taxes": [], "metadata": {"version": "1.0", "change_history": []}}"#,
        )
        .unwrap();
        let registry = TaxRegistry::open(&path).unwrap().with_author("admin");
        registry.add(ibs()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["version"], "1.0");
        assert_eq!(raw["metadata"]["change_history"][0]["author"], "admin");
        assert_eq!(raw["metadata"]["change_history"][0]["change"], "Added tax ibs");
        assert!(raw["metadata"]["last_updated"].is_string());
    }
}
