use rw_core::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Telegram API error: {description}")]
    Telegram { description: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PresenceError>;
