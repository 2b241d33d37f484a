//! Expiry-aware credential cache with cascading re-authentication.
//!
//! Every stage of Microsoft -> Xbox Live -> XSTS -> Minecraft is either
//! Fresh (a valid record is on file and nothing invalidated it during this
//! chain's lifetime) or Stale. Resolving a stage walks up to the nearest
//! Fresh ancestor and then acquires downward, so a kind is never exchanged
//! before everything it depends on is Fresh.

use std::collections::HashSet;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::client::AuthClient;
use crate::credential::{CredentialKind, CredentialRecord};
use crate::errors::{AuthError, Result};
use crate::pkce::PkcePair;
use crate::store::CredentialStore;

/// Failure while walking the chain, with the cached dependency to distrust
/// should the stage's exchange have been rejected
struct StageFailure {
    cached_dependency: Option<CredentialKind>,
    error: AuthError,
}

impl From<AuthError> for StageFailure {
    fn from(error: AuthError) -> Self {
        Self {
            cached_dependency: None,
            error,
        }
    }
}

impl From<rw_core::StorageError> for StageFailure {
    fn from(error: rw_core::StorageError) -> Self {
        AuthError::from(error).into()
    }
}

pub struct TokenChain {
    client: AuthClient,
    store: CredentialStore,
    /// Kinds invalidated during this chain's lifetime
    stale: HashSet<CredentialKind>,
}

impl TokenChain {
    pub fn new(client: AuthClient, store: CredentialStore) -> Self {
        Self {
            client,
            store,
            stale: HashSet::new(),
        }
    }

    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Whether `kind` would currently be served from cache
    pub async fn is_fresh(&self, kind: CredentialKind) -> Result<bool> {
        Ok(self.fresh(kind).await?.is_some())
    }

    /// Return a valid `kind` credential, acquiring upstream stages as needed.
    ///
    /// If an exchange is rejected (401/403) while its input came from cache,
    /// that input is invalidated and the chain re-resolved once.
    #[instrument(skip(self))]
    pub async fn get_valid(&mut self, kind: CredentialKind) -> Result<CredentialRecord> {
        if kind == CredentialKind::MicrosoftRefresh {
            return self
                .fresh(kind)
                .await?
                .ok_or(AuthError::MissingCredential(kind));
        }

        match self.resolve(kind).await {
            Ok(record) => Ok(record),
            Err(StageFailure {
                cached_dependency: Some(dependency),
                error,
            }) if error.is_authorization_failure() => {
                warn!(
                    "{} rejected the cached {} credential ({}), re-deriving it",
                    kind, dependency, error
                );
                self.invalidate(dependency);
                self.resolve(kind).await.map_err(|failure| failure.error)
            }
            Err(failure) => Err(failure.error),
        }
    }

    /// Distrust `kind` and everything derived from it, then re-acquire `kind`.
    ///
    /// Forcing the refresh token itself always ends in
    /// [`AuthError::MissingCredential`]: only a new login can replace it.
    ///
    /// A second authorization failure after this call must not lead to
    /// another forced refresh; the caller owns that budget.
    #[instrument(skip(self))]
    pub async fn force_refresh(&mut self, kind: CredentialKind) -> Result<CredentialRecord> {
        info!("Forcing refresh of {} credential", kind);
        self.invalidate(kind);
        self.get_valid(kind).await
    }

    /// Mark `kind` and its downstream kinds Stale without acquiring anything
    pub fn invalidate(&mut self, kind: CredentialKind) {
        self.stale.insert(kind);
        self.stale.extend(kind.downstream().iter().copied());
    }

    /// Start the interactive login: persist a fresh PKCE verifier and return
    /// the URL the user has to open
    #[instrument(skip(self))]
    pub async fn begin_login(&self, state: Option<&str>) -> Result<Url> {
        let pkce = PkcePair::generate()?;
        self.store.put_pkce_verifier(&pkce.verifier).await?;
        self.client.build_authorize_url(&pkce.challenge, state)
    }

    /// Finish the interactive login with the code the browser step produced
    #[instrument(skip(self, code))]
    pub async fn complete_login(&mut self, code: &str) -> Result<CredentialRecord> {
        let verifier = self
            .store
            .pkce_verifier()
            .await?
            .ok_or(AuthError::MissingPkceVerifier)?;

        let grant = self.client.exchange_code(code, &verifier).await?;
        let refresh = grant
            .refresh
            .ok_or_else(|| AuthError::InvalidResponse("Token response has no refresh_token".to_string()))?;

        self.store.put(&refresh).await?;
        self.store.put(&grant.access).await?;
        self.store.delete_pkce_verifier().await?;

        // The account may have changed, nothing derived earlier can be trusted
        self.invalidate(CredentialKind::MicrosoftAccess);
        self.stale.remove(&CredentialKind::MicrosoftRefresh);
        self.stale.remove(&CredentialKind::MicrosoftAccess);

        info!("Microsoft login completed");
        Ok(grant.access)
    }

    async fn fresh(&self, kind: CredentialKind) -> Result<Option<CredentialRecord>> {
        if self.stale.contains(&kind) {
            return Ok(None);
        }
        Ok(self.store.get(kind).await?.filter(CredentialRecord::is_valid))
    }

    async fn resolve(&mut self, kind: CredentialKind) -> std::result::Result<CredentialRecord, StageFailure> {
        let path = kind.chain_to();

        // Walk up to the nearest Fresh stage
        let mut start = 0;
        let mut current = None;
        for (index, stage) in path.iter().enumerate().rev() {
            if let Some(record) = self.fresh(*stage).await? {
                if index + 1 == path.len() {
                    debug!("{} credential served from cache", kind);
                    return Ok(record);
                }
                start = index + 1;
                current = Some(record);
                break;
            }
        }

        let mut dependency_cached = current.is_some();
        for stage in &path[start..] {
            debug!("Acquiring {} credential", stage);
            let record = match self.acquire(*stage, current.as_ref()).await {
                Ok(record) => record,
                Err(error) => {
                    return Err(StageFailure {
                        cached_dependency: stage
                            .dependency()
                            .filter(|dep| dependency_cached && *dep != CredentialKind::MicrosoftRefresh),
                        error,
                    });
                }
            };

            if !record.is_valid() {
                return Err(AuthError::InvalidResponse(format!(
                    "{} credential was already expired when issued",
                    stage
                ))
                .into());
            }

            self.store.put(&record).await?;
            self.stale.remove(stage);
            dependency_cached = false;
            current = Some(record);
        }

        current.ok_or_else(|| AuthError::MissingCredential(kind).into())
    }

    async fn acquire(
        &mut self,
        kind: CredentialKind,
        dependency: Option<&CredentialRecord>,
    ) -> Result<CredentialRecord> {
        if kind == CredentialKind::MicrosoftAccess {
            return self.acquire_microsoft_access().await;
        }

        let missing = || AuthError::MissingCredential(kind.dependency().unwrap_or(kind));
        let dependency = dependency.ok_or_else(missing)?;

        match kind {
            CredentialKind::XboxLive => self.client.xbl_authenticate(&dependency.token).await,
            CredentialKind::Xsts => self.client.xsts_authorize(&dependency.token).await,
            CredentialKind::Minecraft => {
                let uhs = dependency.user_hash().ok_or_else(missing)?;
                self.client.mc_login(&dependency.token, uhs).await
            }
            CredentialKind::MicrosoftAccess | CredentialKind::MicrosoftRefresh => Err(missing()),
        }
    }

    async fn acquire_microsoft_access(&mut self) -> Result<CredentialRecord> {
        let refresh = self
            .fresh(CredentialKind::MicrosoftRefresh)
            .await?
            .ok_or(AuthError::MissingCredential(CredentialKind::MicrosoftRefresh))?;

        let grant = self.client.refresh_ms_token(&refresh.token).await?;
        if let Some(rotated) = grant.refresh {
            debug!("Storing rotated Microsoft refresh token");
            self.store.put(&rotated).await?;
        }

        Ok(grant.access)
    }
}
