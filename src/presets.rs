//! Built-in model presets for the Bito chat API.
//!
//! Used when the config file does not list any models. Each preset maps a
//! client-facing model name to the Bito model id and model type behind it.

use crate::config::{BackendConfig, ModelEntry};

#[derive(Debug, Clone)]
pub struct ModelPreset {
    pub id: &'static str,
    pub model_id: u64,
    pub ai_model_type: &'static str, // "ADVANCED" or "BASIC"
    pub created: i64,
}

const PRESETS: &[ModelPreset] = &[
    ModelPreset {
        id: "Claude Sonnet 3.7",
        model_id: 42,
        ai_model_type: "ADVANCED",
        created: 1_677_649_963,
    },
    ModelPreset {
        id: "o3-mini High",
        model_id: 38,
        ai_model_type: "ADVANCED",
        created: 1_677_649_963,
    },
];

impl ModelPreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static ModelPreset> {
        PRESETS.iter().find(|p| p.id == name)
    }

    #[must_use]
    pub fn all() -> &'static [ModelPreset] {
        PRESETS
    }

    pub fn to_entry(&self) -> ModelEntry {
        ModelEntry {
            id: self.id.to_string(),
            created: self.created,
            owned_by: "bitoai".to_string(),
            backend: BackendConfig {
                model_id: Some(self.model_id),
                ai_model_type: Some(self.ai_model_type.to_string()),
                ide_name: Some("CLI".to_string()),
                ide_id: Some(0),
                ..BackendConfig::default()
            },
        }
    }
}
