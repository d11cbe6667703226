//! Error types for the proxy.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("No messages provided")]
    EmptyConversation,

    #[error("No user or assistant messages found")]
    NoActionableTurn,

    #[error("Model '{model}' not found")]
    UnknownModel { model: String },

    #[error("Model '{model}' configuration missing modelId")]
    MissingModelId { model: String },

    #[error("Invalid request body: {message}")]
    InvalidRequest { message: String },

    #[error("Bito API error ({status}): {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel {
            model: model.into(),
        }
    }

    pub fn missing_model_id(model: impl Into<String>) -> Self {
        Self::MissingModelId {
            model: model.into(),
        }
    }

    /// HTTP status the gateway answers with when this error is raised before
    /// any upstream call is made.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmptyConversation | Self::NoActionableTurn | Self::InvalidRequest { .. } => 400,
            Self::UnknownModel { .. } => 404,
            Self::UpstreamStatus { .. } | Self::Http(_) => 502,
            _ => 500,
        }
    }

    /// The `error.type` field of the OpenAI-style error body.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::EmptyConversation
            | Self::NoActionableTurn
            | Self::InvalidRequest { .. }
            | Self::UnknownModel { .. }
            | Self::MissingModelId { .. } => "invalid_request_error",
            Self::UpstreamStatus { .. } | Self::Http(_) => "upstream_error",
            _ => "internal_server_error",
        }
    }

    /// Text placed in the content of the single error chunk when an upstream
    /// failure is surfaced inside a stream.
    #[must_use]
    pub fn stream_message(&self) -> String {
        match self {
            Self::UpstreamStatus { .. } => self.to_string(),
            Self::Http(e) => format!("Request error: {e}"),
            other => format!("Request error: {other}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
