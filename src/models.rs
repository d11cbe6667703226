//! Registry of the models this proxy exposes.
//!
//! Built once from config at startup and held by the gateway. The translation
//! layer never sees the registry; it only receives the [`BackendConfig`] that a
//! lookup resolves to.

use crate::config::{BackendConfig, ModelEntry, ProxyConfig};
use crate::error::{ProxyError, Result};
use crate::translate::openai_types::{ModelList, ModelObject};

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.effective_models())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a client-facing model name to its backend settings. The Bito
    /// model id is checked when the payload is built.
    ///
    /// # Errors
    /// `UnknownModel` if no entry has this name.
    pub fn resolve(&self, model: &str) -> Result<&BackendConfig> {
        self.entries
            .iter()
            .find(|e| e.id == model)
            .map(|e| &e.backend)
            .ok_or_else(|| ProxyError::unknown_model(model))
    }

    /// The `/v1/models` listing, in configuration order.
    pub fn list(&self) -> ModelList {
        ModelList {
            object: "list".to_string(),
            data: self
                .entries
                .iter()
                .map(|e| ModelObject {
                    id: e.id.clone(),
                    object: "model".to_string(),
                    created: e.created,
                    owned_by: e.owned_by.clone(),
                })
                .collect(),
        }
    }
}
