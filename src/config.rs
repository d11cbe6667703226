use crate::error::{ProxyError, Result};
use crate::presets::ModelPreset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_UPSTREAM_URL: &str = "https://bitoai.bito.ai/ai/v2/chat/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Models exposed to clients. Empty means "use the built-in presets".
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Frames buffered between the upstream reader and the client writer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

/// A client-facing model name and the Bito backend settings behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default = "default_created")]
    pub created: i64,
    #[serde(default = "default_owned_by")]
    pub owned_by: String,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Bito-side settings for one model. Unset fields fall back to Bito's
/// defaults when the upstream payload is assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ide_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ide_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

fn default_port() -> u16 {
    8787
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_user_agent() -> String {
    format!("bito-proxy/{}", env!("CARGO_PKG_VERSION"))
}

fn default_channel_capacity() -> usize {
    16
}

fn default_max_entries() -> usize {
    10_000
}

fn default_created() -> i64 {
    1_677_649_963
}

fn default_owned_by() -> String {
    "bitoai".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            user_agent: default_user_agent(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream: UpstreamConfig::default(),
            log: LogConfig::default(),
            models: Vec::new(),
        }
    }
}

impl ProxyConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// The configured models, or the built-in presets when none are configured.
    pub fn effective_models(&self) -> Vec<ModelEntry> {
        if self.models.is_empty() {
            ModelPreset::all().iter().map(ModelPreset::to_entry).collect()
        } else {
            self.models.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.upstream.channel_capacity == 0 {
            return Err(ProxyError::config("upstream.channel_capacity must be at least 1"));
        }
        let mut seen = std::collections::HashSet::new();
        for model in &self.models {
            if !seen.insert(model.id.as_str()) {
                return Err(ProxyError::config(format!(
                    "Model '{}' is configured more than once",
                    model.id
                )));
            }
        }
        Ok(())
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("bito-proxy.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("bito-proxy").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("bito-proxy").join("config.toml"));
        paths.push(home.join(".bito-proxy.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[upstream]
url = "http://localhost:9999/chat/"

[[models]]
id = "my-model"

[models.backend]
model_id = 7
temperature = 0.2
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.upstream.url, "http://localhost:9999/chat/");
        assert_eq!(config.upstream.channel_capacity, 16);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].owned_by, "bitoai");
        assert_eq!(config.models[0].backend.model_id, Some(7));
        assert_eq!(config.models[0].backend.temperature, Some(0.2));
    }

    #[test]
    fn test_empty_file_uses_defaults_and_presets() {
        let f = NamedTempFile::new().unwrap();
        let config = ProxyConfig::load(f.path()).unwrap();

        assert_eq!(config.port, 8787);
        assert_eq!(config.upstream.url, DEFAULT_UPSTREAM_URL);
        let ids: Vec<String> = config.effective_models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["Claude Sonnet 3.7", "o3-mini High"]);
    }

    #[test]
    fn test_duplicate_models_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "[[models]]\nid = \"a\"\n\n[[models]]\nid = \"a\"").unwrap();

        let err = ProxyConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ProxyError::Config { .. }));
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "[upstream]\nchannel_capacity = 0").unwrap();

        assert!(ProxyConfig::load(f.path()).is_err());
    }

    #[test]
    fn test_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("bito-proxy.example.toml");
        let config = ProxyConfig::load(&path).unwrap();

        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].backend.model_id, Some(42));
        assert_eq!(config.models[1].backend.model_id, Some(38));
    }
}
