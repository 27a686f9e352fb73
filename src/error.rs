use std::path::PathBuf;

/// Central error type for obsdeck.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("config error: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("not connected to the control server")]
    NotConnected,

    #[error("remote call {method} failed: {message}")]
    RemoteCall { method: String, message: String },

    #[error("remote call {method} timed out")]
    CallTimeout { method: String },

    #[error("failed to spawn command: {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("image asset error: {path}: {source}")]
    Asset {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("duplicate button id: {0}")]
    DuplicateButtonId(String),

    #[error("button not found: {0}")]
    ButtonNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watcher error: {0}")]
    Watcher(String),
}

pub type Result<T> = std::result::Result<T, DeckError>;
