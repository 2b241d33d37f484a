use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;
use directories::ProjectDirs;
use rw_auth::AuthConfig;
use rw_auth::config::defaults;
use rw_core::FileSettingsStore;
use rw_realms::RealmsConfig;
use rw_realms::config::CLIENT_VERSION;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const CHAT_ID_ENV: &str = "TELEGRAM_CHAT_ID";

/// Application configuration, read from `config.toml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub microsoft: MicrosoftSection,
    pub realms: RealmsSection,
    pub presence: PresenceSection,
    pub telegram: TelegramSection,
    pub backup: BackupSection,
    pub storage: StorageSection,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MicrosoftSection {
    pub client_id: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RealmsSection {
    pub world_id: Option<i64>,
    pub world_name: Option<String>,
    pub client_version: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceSection {
    pub grace_minutes: u32,
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    #[serde(deserialize_with = "chat_id")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSection {
    pub enabled: bool,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub settings_path: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let project_dirs = ProjectDirs::from("", "", "realm-watch")
            .ok_or(ConfigError::ProjectDirectoriesUnavailable)?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Read `path`; a missing file yields the defaults
    #[instrument(level = "debug")]
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read config file")
            .map_err(|e| ConfigError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Overlay the Telegram credentials from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(BOT_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = lookup(CHAT_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.telegram.chat_id = Some(chat_id);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.microsoft.redirect_uri).map_err(|e| ConfigError::InvalidValue {
            field: "microsoft.redirect_uri",
            reason: e.to_string(),
        })?;

        if self.microsoft.client_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "microsoft.client_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.backup.count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.count",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "http_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(-12..=14).contains(&self.presence.utc_offset_hours) {
            return Err(ConfigError::InvalidValue {
                field: "presence.utc_offset_hours",
                reason: "must be between -12 and 14".to_string(),
            });
        }
        Ok(())
    }

    /// Bot token and chat id, which must come from the file or the environment
    pub fn telegram_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let bot_token = self
            .telegram
            .bot_token
            .as_deref()
            .ok_or(ConfigError::MissingField {
                field: "telegram.bot_token",
                env: BOT_TOKEN_ENV,
            })?;
        let chat_id = self
            .telegram
            .chat_id
            .as_deref()
            .ok_or(ConfigError::MissingField {
                field: "telegram.chat_id",
                env: CHAT_ID_ENV,
            })?;
        Ok((bot_token, chat_id))
    }

    pub fn settings_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.settings_path {
            Some(path) => Ok(path.clone()),
            None => FileSettingsStore::default_path()
                .map_err(|_| ConfigError::ProjectDirectoriesUnavailable),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn grace(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.presence.grace_minutes))
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::custom(&self.microsoft.client_id, &self.microsoft.redirect_uri)
            .with_timeout(self.http_timeout())
    }

    pub fn realms_config(&self) -> RealmsConfig {
        RealmsConfig {
            client_version: self.realms.client_version.clone(),
            timeout: self.http_timeout(),
            ..RealmsConfig::default()
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            microsoft: MicrosoftSection::default(),
            realms: RealmsSection::default(),
            presence: PresenceSection::default(),
            telegram: TelegramSection::default(),
            backup: BackupSection::default(),
            storage: StorageSection::default(),
            http_timeout_secs: 15,
        }
    }
}

impl Default for MicrosoftSection {
    fn default() -> Self {
        Self {
            client_id: defaults::CLIENT_ID.to_string(),
            redirect_uri: defaults::REDIRECT_URI.to_string(),
        }
    }
}

impl Default for RealmsSection {
    fn default() -> Self {
        Self {
            world_id: None,
            world_name: None,
            client_version: CLIENT_VERSION.to_string(),
        }
    }
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            grace_minutes: 10,
            utc_offset_hours: 3,
        }
    }
}

impl Default for BackupSection {
    fn default() -> Self {
        Self {
            enabled: false,
            count: 1,
        }
    }
}

/// Chat ids are numeric for groups but `@name` for channels
fn chat_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChatId {
        Numeric(i64),
        Named(String),
    }

    Ok(Option::<ChatId>::deserialize(deserializer)?.map(|id| match id {
        ChatId::Numeric(id) => id.to_string(),
        ChatId::Named(name) => name,
    }))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Project directories are unavailable - this usually indicates an unsupported OS or missing home directory"
    )]
    ProjectDirectoriesUnavailable,

    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Missing `{field}` - set it in the config file or via {env}")]
    MissingField {
        field: &'static str,
        env: &'static str,
    },

    #[error("Invalid `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
