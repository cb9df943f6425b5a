//! Error types for kpulse

use thiserror::Error;

/// Main error type for kpulse
#[derive(Error, Debug)]
pub enum KpulseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("service '{name}' not found in namespace '{namespace}'")]
    NotFound { name: String, namespace: String },

    #[error("no running pods available for service '{0}'")]
    NoBackend(String),

    #[error("dial failed: {0}")]
    Dial(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("response timeout after {0:.1} seconds")]
    ResponseTimeout(f64),

    #[error("transport read error: {0}")]
    TransportRead(String),

    #[error("transport write error: {0}")]
    TransportWrite(String),
}

impl KpulseError {
    /// Whether this error means the tunnel session itself is unusable.
    ///
    /// Exchange-scoped failures (a timed-out or malformed response) leave the
    /// session open for the next exchange; stream-level failures require the
    /// supervisor to recreate the session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            KpulseError::TransportRead(_) | KpulseError::TransportWrite(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KpulseError>;
