use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed notification: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Queue error: {0}")]
    Queue(#[source] anyhow::Error),

    #[error("Copy failed for {key}: {reason}")]
    CopyFailed { key: String, reason: String },

    #[error("Part {part_number} of {key} failed: {reason}")]
    PartFailed {
        key: String,
        part_number: i32,
        reason: String,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Launch failed: {0}")]
    Launch(String),
}

impl MigrationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MigrationError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
