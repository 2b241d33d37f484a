use std::time::Duration;

/// Identity provider and Xbox/Minecraft endpoints
pub mod endpoints {
    pub const MS_AUTHORIZE: &str =
        "https://login.microsoftonline.com/consumers/oauth2/v2.0/authorize";
    pub const MS_TOKEN: &str = "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
    pub const XBL_AUTHENTICATE: &str = "https://user.auth.xboxlive.com/user/authenticate";
    pub const XSTS_AUTHORIZE: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
    pub const MC_LOGIN: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
}

/// Azure application used for the consumer login
pub mod defaults {
    pub const CLIENT_ID: &str = "c36a9fb6-4f2a-41ff-90bd-ae7cc92031eb";
    pub const REDIRECT_URI: &str = "http://localhost:3000";
    pub const SCOPE: &str = "XboxLive.signin offline_access";
}

/// Relying parties
pub const RP_XBOX_AUTH: &str = "http://auth.xboxlive.com";
pub const RP_MINECRAFT: &str = "rp://api.minecraftservices.com/";

/// Safety margin subtracted from every provider expiry at write time
pub const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Xbox Live / XSTS lifetime when `NotAfter` is missing or unparseable
pub const XBOX_FALLBACK_LIFETIME: Duration = Duration::from_secs(23 * 3600);

/// Minecraft `expires_in` when the response omits it
pub const MC_DEFAULT_EXPIRES_IN: u64 = 23 * 3600;

/// Endpoint set, overridable so the chain can be pointed at a mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub ms_authorize: String,
    pub ms_token: String,
    pub xbl_authenticate: String,
    pub xsts_authorize: String,
    pub mc_login: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ms_authorize: endpoints::MS_AUTHORIZE.to_string(),
            ms_token: endpoints::MS_TOKEN.to_string(),
            xbl_authenticate: endpoints::XBL_AUTHENTICATE.to_string(),
            xsts_authorize: endpoints::XSTS_AUTHORIZE.to_string(),
            mc_login: endpoints::MC_LOGIN.to_string(),
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(15),
        }
    }
}

/// Configuration for [`AuthClient`](crate::AuthClient)
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client ID of the Azure application
    pub client_id: String,

    /// OAuth redirect URI registered for the application
    pub redirect_uri: String,

    /// Requested scopes, space separated
    pub scope: String,

    pub endpoints: Endpoints,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,
}

impl AuthConfig {
    /// Create config for a custom Azure application
    pub fn custom(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeouts = HttpTimeouts {
            connect: timeout,
            request: timeout,
        };
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: defaults::CLIENT_ID.to_string(),
            redirect_uri: defaults::REDIRECT_URI.to_string(),
            scope: defaults::SCOPE.to_string(),
            endpoints: Endpoints::default(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("realm-watch".to_string()),
        }
    }
}
