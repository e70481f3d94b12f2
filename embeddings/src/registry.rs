//! Embedding model catalog and the currently selected model.
//!
//! The registry owns a fixed catalog of [`EmbeddingModelConfig`]s and tracks
//! which one is current. Selecting a model persists it through a
//! [`ModelSelectionStore`] so the choice survives restarts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EmbeddingError, Result};

/// ID reported by [`ModelRegistry::current_model`] before any model is chosen.
pub const FALLBACK_MODEL_ID: &str = "default";

/// Dimensionality of the fallback model.
pub const FALLBACK_DIMENSIONS: usize = 1536;

/// Configuration of one embedding model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelConfig {
    /// Stable identifier, e.g. `openai-text-embedding-3-small`.
    pub id: String,

    /// Length of every vector the model produces.
    pub dimensions: usize,

    /// Whether this is the catalog's default model.
    #[serde(default)]
    pub is_default: bool,
}

impl EmbeddingModelConfig {
    pub fn new(id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            id: id.into(),
            dimensions,
            is_default: false,
        }
    }

    /// Mark this config as the catalog default.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// The model reported when nothing has been selected yet.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_MODEL_ID, FALLBACK_DIMENSIONS).as_default()
    }
}

/// The models shipped with the dashboard.
pub fn builtin_catalog() -> Vec<EmbeddingModelConfig> {
    vec![
        EmbeddingModelConfig::new("openai-text-embedding-3-small", 1536).as_default(),
        EmbeddingModelConfig::new("openai-text-embedding-3-large", 3072),
        EmbeddingModelConfig::new("openai-text-embedding-ada-002", 1536),
        EmbeddingModelConfig::new("local-minilm-l6-v2", 384),
    ]
}

/// Durable home for the current model selection.
pub trait ModelSelectionStore: Send + Sync {
    /// ID of the previously saved model, if any.
    fn load(&self) -> Result<Option<String>>;

    /// Persist `model` as the current selection.
    fn save(&self, model: &EmbeddingModelConfig) -> Result<()>;
}

impl<T: ModelSelectionStore + ?Sized> ModelSelectionStore for Arc<T> {
    fn load(&self) -> Result<Option<String>> {
        (**self).load()
    }

    fn save(&self, model: &EmbeddingModelConfig) -> Result<()> {
        (**self).save(model)
    }
}

/// Keeps the selection in memory only.
#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    saved: Mutex<Option<EmbeddingModelConfig>>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last saved selection.
    pub fn saved(&self) -> Option<EmbeddingModelConfig> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ModelSelectionStore for MemorySelectionStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.saved().map(|m| m.id))
    }

    fn save(&self, model: &EmbeddingModelConfig) -> Result<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(model.clone());
        Ok(())
    }
}

/// Stores the selection as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSelectionStore {
    path: PathBuf,
}

impl FileSelectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, e: impl std::fmt::Display) -> EmbeddingError {
        EmbeddingError::Persistence(format!("{}: {e}", self.path.display()))
    }
}

impl ModelSelectionStore for FileSelectionStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.persistence_error(e))?;
        let model: EmbeddingModelConfig =
            serde_json::from_str(&content).map_err(|e| self.persistence_error(e))?;
        Ok(Some(model.id))
    }

    fn save(&self, model: &EmbeddingModelConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(model)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.persistence_error(e))?;
        }

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).map_err(|e| self.persistence_error(e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| self.persistence_error(e))?;

        debug!("Saved model selection: {}", model.id);
        Ok(())
    }
}

/// Catalog of supported embedding models plus the current selection.
pub struct ModelRegistry {
    catalog: Vec<EmbeddingModelConfig>,
    current: RwLock<Option<EmbeddingModelConfig>>,
    store: Box<dyn ModelSelectionStore>,
}

impl ModelRegistry {
    /// Create a registry over `catalog` with nothing selected.
    ///
    /// Fails if the catalog has duplicate IDs, zero-dimension models or more
    /// than one default.
    pub fn new(
        catalog: Vec<EmbeddingModelConfig>,
        store: impl ModelSelectionStore + 'static,
    ) -> Result<Self> {
        validate_catalog(&catalog)?;

        Ok(Self {
            catalog,
            current: RwLock::new(None),
            store: Box::new(store),
        })
    }

    /// Create a registry and restore the selection saved in `store`.
    ///
    /// A saved ID that is no longer in the catalog is ignored.
    pub fn load(
        catalog: Vec<EmbeddingModelConfig>,
        store: impl ModelSelectionStore + 'static,
    ) -> Result<Self> {
        let registry = Self::new(catalog, store)?;

        if let Some(id) = registry.store.load()? {
            match registry.find(&id) {
                Some(model) => {
                    info!("Restored embedding model: {id}");
                    *registry.current.write().unwrap_or_else(PoisonError::into_inner) =
                        Some(model.clone());
                }
                None => warn!("Saved embedding model {id} is not in the catalog, ignoring"),
            }
        }

        Ok(registry)
    }

    /// The supported models, in catalog order.
    pub fn list_supported_models(&self) -> Vec<EmbeddingModelConfig> {
        self.catalog.clone()
    }

    /// Look up a catalog entry.
    pub fn find(&self, id: &str) -> Option<&EmbeddingModelConfig> {
        self.catalog.iter().find(|m| m.id == id)
    }

    /// The catalog entry flagged as default, if any.
    pub fn default_model(&self) -> Option<&EmbeddingModelConfig> {
        self.catalog.iter().find(|m| m.is_default)
    }

    /// The active model, or [`EmbeddingModelConfig::fallback`] if none has
    /// been selected.
    pub fn current_model(&self) -> EmbeddingModelConfig {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(EmbeddingModelConfig::fallback)
    }

    /// Make `id` the current model.
    ///
    /// Returns `Ok(false)` and changes nothing when `id` is not in the
    /// catalog. The selection is persisted before it takes effect, so a
    /// persistence error leaves the current model as it was.
    pub fn set_current_model(&self, id: &str) -> Result<bool> {
        let Some(model) = self.find(id) else {
            debug!("Unknown embedding model: {id}");
            return Ok(false);
        };

        // Save and assign under one lock so the persisted selection always
        // matches the one in memory.
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        self.store.save(model)?;
        *current = Some(model.clone());
        drop(current);

        info!("Switched embedding model to {id} ({} dimensions)", model.dimensions);
        Ok(true)
    }
}

fn validate_catalog(catalog: &[EmbeddingModelConfig]) -> Result<()> {
    let mut seen = HashSet::new();
    for model in catalog {
        if model.dimensions == 0 {
            return Err(EmbeddingError::InvalidCatalog(format!(
                "model {} has zero dimensions",
                model.id
            )));
        }
        if !seen.insert(model.id.as_str()) {
            return Err(EmbeddingError::InvalidCatalog(format!(
                "duplicate model id {}",
                model.id
            )));
        }
    }

    let defaults = catalog.iter().filter(|m| m.is_default).count();
    if defaults > 1 {
        return Err(EmbeddingError::InvalidCatalog(format!(
            "{defaults} models are marked default"
        )));
    }

    Ok(())
}
