use serde::{Deserialize, Serialize};

use crate::config::{RP_MINECRAFT, RP_XBOX_AUTH};

/// Token endpoint response for the code and refresh grants
#[derive(Debug, Clone, Deserialize)]
pub struct MsTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Microsoft OAuth error body
#[derive(Debug, Clone, Deserialize)]
pub struct MsErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Envelope shared by user.authenticate and xsts/authorize
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxTokenRequest<P> {
    pub properties: P,
    pub relying_party: &'static str,
    pub token_type: &'static str,
}

impl XboxTokenRequest<UserTokenProperties> {
    /// Exchange a Microsoft ticket for a Xbox Live user token
    pub fn user(rps_ticket: impl Into<String>) -> Self {
        Self {
            properties: UserTokenProperties {
                auth_method: "RPS",
                site_name: "user.auth.xboxlive.com",
                rps_ticket: rps_ticket.into(),
            },
            relying_party: RP_XBOX_AUTH,
            token_type: "JWT",
        }
    }
}

impl XboxTokenRequest<XstsProperties> {
    /// Exchange a user token for a XSTS token scoped to Minecraft services
    pub fn minecraft_xsts(user_token: impl Into<String>) -> Self {
        Self {
            properties: XstsProperties {
                sandbox_id: "RETAIL",
                user_tokens: vec![user_token.into()],
            },
            relying_party: RP_MINECRAFT,
            token_type: "JWT",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserTokenProperties {
    pub auth_method: &'static str,
    pub site_name: &'static str,
    pub rps_ticket: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsProperties {
    pub sandbox_id: &'static str,
    pub user_tokens: Vec<String>,
}

/// Xbox Live and XSTS response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxTokenResponse {
    pub token: String,
    pub display_claims: DisplayClaims,
    #[serde(default)]
    pub issue_instant: Option<String>,
    #[serde(default)]
    pub not_after: Option<String>,
}

impl XboxTokenResponse {
    /// User hash of the first `xui` claim
    pub fn user_hash(&self) -> Option<&str> {
        self.display_claims
            .xui
            .first()
            .map(|info| info.uhs.as_str())
            .filter(|uhs| !uhs.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayClaims {
    pub xui: Vec<UserClaim>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserClaim {
    pub uhs: String,
}

/// Body of a XSTS 401 carrying an account-level error code
#[derive(Debug, Clone, Deserialize)]
pub struct XstsErrorResponse {
    #[serde(rename = "XErr")]
    pub xerr: u64,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Redirect", default)]
    pub redirect: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McLoginRequest {
    pub identity_token: String,
}

/// `login_with_xbox` response; `expires_in` is absent on some accounts
#[derive(Debug, Clone, Deserialize)]
pub struct McLoginResponse {
    #[serde(default)]
    pub username: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
