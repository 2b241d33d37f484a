use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealmsError {
    /// The Minecraft token was rejected; the caller decides whether to
    /// refresh it and retry
    #[error("Minecraft session rejected with HTTP {0}")]
    AuthExpired(StatusCode),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: StatusCode,
        body_snippet: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Minecraft profile not found - user may not own Minecraft or hasn't created a profile")]
    ProfileNotFound,

    #[error("Realm {0} not found")]
    WorldNotFound(i64),
}

impl RealmsError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }
}

pub type Result<T> = std::result::Result<T, RealmsError>;
