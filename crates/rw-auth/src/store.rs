use std::sync::Arc;

use chrono::DateTime;
use rw_core::{SettingsStore, StorageError};
use tracing::warn;

use crate::credential::{CredentialKind, CredentialRecord};

/// Setting key of the PKCE verifier awaiting its code exchange
pub const PKCE_VERIFIER_KEY: &str = "ms_pkce_verifier";

/// Credential records on top of a [`SettingsStore`].
///
/// Each record is spread over `<prefix>_token`, `<prefix>_expires` (unix
/// seconds) and `<prefix>_user_hash`, written in one batch.
#[derive(Clone)]
pub struct CredentialStore {
    settings: Arc<dyn SettingsStore>,
}

impl CredentialStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub async fn get(&self, kind: CredentialKind) -> Result<Option<CredentialRecord>, StorageError> {
        let Some(token) = self.settings.get(&token_key(kind)).await? else {
            return Ok(None);
        };

        let expires_at = match self.settings.get(&expires_key(kind)).await? {
            Some(raw) => {
                let parsed = raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0));
                if parsed.is_none() {
                    warn!("Ignoring unparseable expiry for {} credential: {:?}", kind, raw);
                }
                parsed
            }
            None => None,
        };

        let user_hash = if kind.requires_user_hash() {
            self.settings.get(&user_hash_key(kind)).await?
        } else {
            None
        };

        Ok(Some(CredentialRecord {
            kind,
            token,
            expires_at,
            user_hash,
        }))
    }

    pub async fn put(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let kind = record.kind;
        let mut entries = vec![(token_key(kind), record.token.clone())];

        if let Some(expires_at) = record.expires_at {
            entries.push((expires_key(kind), expires_at.timestamp().to_string()));
        }
        if let Some(user_hash) = &record.user_hash {
            entries.push((user_hash_key(kind), user_hash.clone()));
        }

        self.settings.set_many(&entries).await
    }

    pub async fn delete(&self, kind: CredentialKind) -> Result<(), StorageError> {
        self.settings
            .delete_many(&[token_key(kind), expires_key(kind), user_hash_key(kind)])
            .await
    }

    pub async fn pkce_verifier(&self) -> Result<Option<String>, StorageError> {
        self.settings.get(PKCE_VERIFIER_KEY).await
    }

    pub async fn put_pkce_verifier(&self, verifier: &str) -> Result<(), StorageError> {
        self.settings.set(PKCE_VERIFIER_KEY, verifier).await
    }

    pub async fn delete_pkce_verifier(&self) -> Result<(), StorageError> {
        self.settings.delete(PKCE_VERIFIER_KEY).await
    }
}

fn token_key(kind: CredentialKind) -> String {
    format!("{}_token", kind.key_prefix())
}

fn expires_key(kind: CredentialKind) -> String {
    format!("{}_expires", kind.key_prefix())
}

fn user_hash_key(kind: CredentialKind) -> String {
    format!("{}_user_hash", kind.key_prefix())
}
