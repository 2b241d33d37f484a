use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{AuthConfig, MC_DEFAULT_EXPIRES_IN};
use crate::credential::{CredentialKind, CredentialRecord};
use crate::errors::{AuthError, Result, XstsError};
use crate::models::*;

/// Tokens returned by the Microsoft token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrosoftGrant {
    pub access: CredentialRecord,
    /// Present when the provider rotated (or first issued) the refresh token
    pub refresh: Option<CredentialRecord>,
}

/// HTTP client for the four token exchanges
#[derive(Debug, Clone)]
pub struct AuthClient {
    config: AuthConfig,
    http: Client,
}

impl AuthClient {
    /// Create a new authentication client
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("realm-watch"))
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the authorization URL for the user to visit
    #[instrument(skip(self, code_challenge))]
    pub fn build_authorize_url(&self, code_challenge: &str, state: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoints.ms_authorize)?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scope)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("prompt", "select_account");

        if let Some(s) = state {
            url.query_pairs_mut().append_pair("state", s);
        }

        debug!("Built authorize URL: {}", url);
        Ok(url)
    }

    /// Parse the redirect URL and extract the authorization code
    #[instrument(skip(self, redirect_url))]
    pub fn parse_redirect(&self, redirect_url: &str, expected_state: Option<&str>) -> Result<String> {
        let url = Url::parse(redirect_url)?;
        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();

        if let Some(error) = params.get("error") {
            if error == "access_denied" {
                return Err(AuthError::UserCancelled);
            }
            return Err(AuthError::InvalidRedirect);
        }

        if let Some(expected) = expected_state {
            match params.get("state") {
                Some(actual) if actual == expected => {}
                _ => return Err(AuthError::StateMismatch),
            }
        }

        params
            .get("code")
            .map(|c| c.to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::InvalidRedirect)
    }

    /// Exchange authorization code (plus PKCE verifier) for Microsoft tokens
    #[instrument(skip(self, code, code_verifier))]
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<MicrosoftGrant> {
        debug!("Exchanging authorization code for tokens");
        self.request_ms_token(&[
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ])
        .await
    }

    /// Refresh Microsoft tokens using refresh_token
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_ms_token(&self, refresh_token: &str) -> Result<MicrosoftGrant> {
        debug!("Refreshing Microsoft access token");
        self.request_ms_token(&[
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", self.config.scope.as_str()),
        ])
        .await
    }

    async fn request_ms_token(&self, form: &[(&str, &str)]) -> Result<MicrosoftGrant> {
        let response = self
            .http
            .post(&self.config.endpoints.ms_token)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            let invalid_grant = serde_json::from_str::<MsErrorResponse>(&body)
                .map(|e| e.error == "invalid_grant")
                .unwrap_or_else(|_| body.contains("invalid_grant"));
            if invalid_grant {
                return Err(AuthError::OAuthInvalidGrant);
            }

            return Err(AuthError::Exchange {
                stage: CredentialKind::MicrosoftAccess,
                status,
                body_snippet: snippet(&body),
            });
        }

        let token_response: MsTokenResponse = response.json().await?;
        Ok(MicrosoftGrant {
            access: CredentialRecord::expiring_in(
                CredentialKind::MicrosoftAccess,
                token_response.access_token,
                token_response.expires_in,
            ),
            refresh: token_response
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(CredentialRecord::refresh_token),
        })
    }

    /// Authenticate with Xbox Live
    #[instrument(skip(self, ms_access_token))]
    pub async fn xbl_authenticate(&self, ms_access_token: &str) -> Result<CredentialRecord> {
        debug!("Authenticating with Xbox Live");
        let mut response = self.post_xbl(&format!("d={}", ms_access_token)).await?;

        // Tokens from the live.com endpoints want the bare ticket
        if response.status() == StatusCode::BAD_REQUEST {
            warn!("XBL authentication rejected 'd=' ticket, retrying with bare token");
            response = self.post_xbl(ms_access_token).await?;
        }

        if !response.status().is_success() {
            return Err(exchange_failure(CredentialKind::XboxLive, response).await);
        }

        let xbl_response: XboxTokenResponse = response.json().await?;
        xbox_record(CredentialKind::XboxLive, xbl_response)
    }

    async fn post_xbl(&self, rps_ticket: &str) -> Result<Response> {
        self.post_xbox(&self.config.endpoints.xbl_authenticate, &XboxTokenRequest::user(rps_ticket))
            .await
    }

    async fn post_xbox<P: Serialize>(&self, url: &str, request: &XboxTokenRequest<P>) -> Result<Response> {
        Ok(self
            .http
            .post(url)
            .header("Accept", "application/json")
            .header("x-xbl-contract-version", "1")
            .json(request)
            .send()
            .await?)
    }

    /// Authorize with XSTS for the Minecraft services relying party
    #[instrument(skip(self, xbl_token))]
    pub async fn xsts_authorize(&self, xbl_token: &str) -> Result<CredentialRecord> {
        debug!("Authorizing with XSTS");
        let response = self
            .post_xbox(
                &self.config.endpoints.xsts_authorize,
                &XboxTokenRequest::minecraft_xsts(xbl_token),
            )
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();

            // An XErr code is an account problem, not a stale Xbox Live token
            if let Ok(error_response) = serde_json::from_str::<XstsErrorResponse>(&body) {
                return Err(XstsError::from_xerr(error_response.xerr).into());
            }

            return Err(AuthError::Exchange {
                stage: CredentialKind::Xsts,
                status: StatusCode::UNAUTHORIZED,
                body_snippet: snippet(&body),
            });
        }

        if !response.status().is_success() {
            return Err(exchange_failure(CredentialKind::Xsts, response).await);
        }

        let xsts_response: XboxTokenResponse = response.json().await?;
        xbox_record(CredentialKind::Xsts, xsts_response)
    }

    /// Login to Minecraft with XSTS token
    #[instrument(skip(self, xsts_token, uhs))]
    pub async fn mc_login(&self, xsts_token: &str, uhs: &str) -> Result<CredentialRecord> {
        let identity_token = format!("XBL3.0 x={};{}", uhs, xsts_token);
        let request = McLoginRequest { identity_token };

        debug!("Logging in to Minecraft Services");
        let response = self
            .http
            .post(&self.config.endpoints.mc_login)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(exchange_failure(CredentialKind::Minecraft, response).await);
        }

        let mc_response: McLoginResponse = response.json().await?;
        Ok(CredentialRecord::expiring_in(
            CredentialKind::Minecraft,
            mc_response.access_token,
            mc_response.expires_in.unwrap_or(MC_DEFAULT_EXPIRES_IN),
        ))
    }
}

fn xbox_record(kind: CredentialKind, response: XboxTokenResponse) -> Result<CredentialRecord> {
    let uhs = response
        .user_hash()
        .ok_or_else(|| AuthError::InvalidResponse(format!("{} response is missing XUI claims", kind)))?
        .to_string();

    Ok(CredentialRecord::from_not_after(kind, response.token, response.not_after.as_deref())
        .with_user_hash(uhs))
}

async fn exchange_failure(stage: CredentialKind, response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AuthError::Exchange {
        stage,
        status,
        body_snippet: snippet(&body),
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
