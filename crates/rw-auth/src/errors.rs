use reqwest::StatusCode;
use rw_core::StorageError;
use thiserror::Error;

use crate::credential::CredentialKind;

/// Token chain error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Credential storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Missing {0} credential - interactive login required")]
    MissingCredential(CredentialKind),

    #[error("OAuth invalid_grant - refresh token expired or revoked, login required")]
    OAuthInvalidGrant,

    #[error("{stage} exchange failed with HTTP {status}: {body_snippet}")]
    Exchange {
        stage: CredentialKind,
        status: StatusCode,
        body_snippet: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("XSTS authorization denied: {0}")]
    XstsDenied(#[from] XstsError),

    #[error("No PKCE verifier on file - start the login again")]
    MissingPkceVerifier,

    #[error("User cancelled the authentication flow")]
    UserCancelled,

    #[error("Invalid redirect URI or missing code")]
    InvalidRedirect,

    #[error("OAuth state mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Random number generator failed: {0}")]
    Random(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl AuthError {
    /// The provider rejected the presented credential (HTTP 401/403)
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            Self::Exchange { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }

    /// Only a human completing the browser login can resolve this error
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_) | Self::OAuthInvalidGrant | Self::MissingPkceVerifier
        )
    }
}

/// XSTS-specific error codes from XErr field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XstsError {
    #[error("Account doesn't have an Xbox account (XErr: 2148916233)")]
    NoXboxAccount,

    #[error("Xbox Live not available in this country (XErr: 2148916235)")]
    RegionNotSupported,

    #[error("Adult verification required on Xbox page (XErr: 2148916236/2148916237)")]
    AdultVerificationRequired,

    #[error("Child account requires Family (XErr: 2148916238)")]
    ChildAccountRequiresFamily,

    #[error("Unknown XSTS error code: {0}")]
    Unknown(u64),
}

impl XstsError {
    /// Parse XErr code from XSTS response
    pub fn from_xerr(code: u64) -> Self {
        match code {
            2148916233 => Self::NoXboxAccount,
            2148916235 => Self::RegionNotSupported,
            2148916236 | 2148916237 => Self::AdultVerificationRequired,
            2148916238 => Self::ChildAccountRequiresFamily,
            code => Self::Unknown(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
