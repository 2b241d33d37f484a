use std::time::Duration;

pub const REALMS_BASE: &str = "https://pc.realms.minecraft.net";
pub const MC_PROFILE: &str = "https://api.minecraftservices.com/minecraft/profile";

/// Client version announced in the Realms session cookie
pub const CLIENT_VERSION: &str = "1.20.4";

#[derive(Debug, Clone)]
pub struct RealmsConfig {
    pub base_url: String,
    pub profile_url: String,
    pub client_version: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl RealmsConfig {
    pub fn with_base_urls(mut self, base_url: impl Into<String>, profile_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.profile_url = profile_url.into();
        self
    }
}

impl Default for RealmsConfig {
    fn default() -> Self {
        Self {
            base_url: REALMS_BASE.to_string(),
            profile_url: MC_PROFILE.to_string(),
            client_version: CLIENT_VERSION.to_string(),
            timeout: Duration::from_secs(15),
            user_agent: Some("realm-watch".to_string()),
        }
    }
}
