//! Microsoft -> Xbox Live -> XSTS -> Minecraft token chain
//!
//! This crate keeps a Minecraft services bearer token valid for unattended
//! jobs. Each credential in the chain is cached in a settings store with its
//! own expiry and renewed from the credential above it only when needed.
//!
//! # Authentication Flow
//!
//! 1. One-time interactive login: authorization code + PKCE, yielding a
//!    Microsoft refresh token
//! 2. Microsoft access token from the refresh token
//! 3. Xbox Live authentication
//! 4. XSTS authorization for `rp://api.minecraftservices.com/`
//! 5. Minecraft Services login
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rw_auth::{AuthClient, AuthConfig, CredentialKind, CredentialStore, TokenChain};
//! use rw_core::FileSettingsStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = FileSettingsStore::new(FileSettingsStore::default_path()?).await?;
//! let store = CredentialStore::new(Arc::new(settings));
//! let mut chain = TokenChain::new(AuthClient::new(AuthConfig::default())?, store);
//!
//! let minecraft = chain.get_valid(CredentialKind::Minecraft).await?;
//!
//! // A downstream API answered 401: distrust the token once and retry
//! let minecraft = chain.force_refresh(CredentialKind::Minecraft).await?;
//! # let _ = minecraft;
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Expiries are stored 60 seconds early
//! - Tokens should never be logged; `CredentialRecord`'s `Debug` redacts them
//! - A rejected refresh token can only be replaced by a new interactive login

pub mod chain;
pub mod client;
pub mod config;
pub mod credential;
pub mod errors;
pub mod models;
pub mod pkce;
pub mod store;

// Re-export main types
pub use chain::TokenChain;
pub use client::{AuthClient, MicrosoftGrant};
pub use config::{AuthConfig, Endpoints, HttpTimeouts};
pub use credential::{CredentialKind, CredentialRecord};
pub use errors::{AuthError, Result, XstsError};
pub use pkce::{PkcePair, challenge_for};
pub use store::CredentialStore;
