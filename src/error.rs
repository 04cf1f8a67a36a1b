//! Error types for the bridge.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("No API key for provider '{provider}'. Set {env_var} with your provider API key.")]
    MissingCredential {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("Upstream returned {status} {status_text}: {body}")]
    UpstreamHttp {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Operation '{operation}' is not supported by OpenAI-compatible providers")]
    UnsupportedOperation { operation: &'static str },

    /// A single malformed stream frame. Logged and skipped by the stream, never yielded.
    #[error("Stream protocol error: {message}")]
    StreamProtocol { message: String },

    #[error("Request was aborted by the caller")]
    TransportAbort,

    #[error("Provider '{provider}' is active; the OpenAI-compatible generator is disabled")]
    ProviderInactive { provider: &'static str },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Translation error: {message}")]
    Translation { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation {
            message: msg.into(),
        }
    }

    pub fn stream_protocol(msg: impl Into<String>) -> Self {
        Self::StreamProtocol {
            message: msg.into(),
        }
    }

    pub fn unsupported(operation: &'static str) -> Self {
        Self::UnsupportedOperation { operation }
    }

    /// True for errors raised because the caller cancelled the call.
    #[must_use]
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::TransportAbort)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
