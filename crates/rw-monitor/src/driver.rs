use std::sync::Arc;

use chrono::Utc;
use rw_auth::{AuthClient, AuthError, CredentialKind, CredentialStore, TokenChain};
use rw_core::{FileSettingsStore, SettingsStore, StorageError};
use rw_presence::{PresenceError, PresenceReporter, TelegramPublisher};
use rw_realms::{RealmsClient, RealmsError, RealmsIdentity, WorldDetail, WorldSummary};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, MonitorConfig};

pub const BACKUP_ID_KEY: &str = "realm_backup_id";
pub const BACKUP_URL_KEY: &str = "realm_backup_url";

/// Which realm to watch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldTarget {
    Id(i64),
    Name(String),
    First,
}

impl WorldTarget {
    pub fn from_config(config: &MonitorConfig) -> Self {
        match (&config.realms.world_id, &config.realms.world_name) {
            (Some(id), _) => Self::Id(*id),
            (None, Some(name)) => Self::Name(name.clone()),
            (None, None) => Self::First,
        }
    }

    pub fn select<'a>(&self, worlds: &'a [WorldSummary]) -> Result<&'a WorldSummary, MonitorError> {
        if worlds.is_empty() {
            return Err(MonitorError::NoWorlds);
        }

        match self {
            Self::Id(id) => worlds
                .iter()
                .find(|world| world.id == *id)
                .ok_or_else(|| MonitorError::TargetWorldMissing(format!("id {}", id))),
            Self::Name(name) => worlds
                .iter()
                .find(|world| {
                    world
                        .name
                        .as_deref()
                        .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
                })
                .ok_or_else(|| MonitorError::TargetWorldMissing(format!("name {:?}", name))),
            Self::First => Ok(&worlds[0]),
        }
    }
}

/// Outcome of one successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub world: String,
    pub online: Vec<String>,
    pub backup_url: Option<String>,
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Realms(#[from] RealmsError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("The account has no realms")]
    NoWorlds,

    #[error("Configured realm not found: {0}")]
    TargetWorldMissing(String),
}

impl MonitorError {
    /// Whether the operator has to run the interactive login
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Auth(e) if e.requires_login())
    }
}

/// Open the settings file named by the config
pub async fn open_settings(config: &MonitorConfig) -> Result<Arc<dyn SettingsStore>, MonitorError> {
    let store = FileSettingsStore::new(config.settings_path()?).await?;
    Ok(Arc::new(store))
}

pub fn token_chain(
    config: &MonitorConfig,
    settings: Arc<dyn SettingsStore>,
) -> Result<TokenChain, MonitorError> {
    let client = AuthClient::new(config.auth_config())?;
    Ok(TokenChain::new(client, CredentialStore::new(settings)))
}

/// Realms session for a single run.
///
/// Holds the identity sent to Realms and whether this run already spent its
/// forced refresh.
struct Session {
    identity: RealmsIdentity,
    refreshed: bool,
}

impl Session {
    async fn refresh(&mut self, chain: &mut TokenChain) -> Result<(), MonitorError> {
        warn!("Realms rejected the Minecraft session, forcing a token refresh");
        self.refreshed = true;
        self.identity.access_token = chain.force_refresh(CredentialKind::Minecraft).await?.token;
        Ok(())
    }
}

/// Run a Realms request, spending the run's single forced refresh when the
/// session is rejected. A second rejection propagates.
macro_rules! with_session {
    ($monitor:ident, $session:ident, |$identity:ident| $call:expr) => {
        loop {
            let result = {
                let $identity = &$session.identity;
                $call.await
            };
            match result {
                Err(e) if e.is_auth_expired() && !$session.refreshed => {
                    $session.refresh(&mut $monitor.chain).await?;
                }
                other => break other?,
            }
        }
    };
}

/// Chains authentication, Realms and presence publishing for one realm
pub struct Monitor {
    chain: TokenChain,
    realms: RealmsClient,
    reporter: PresenceReporter,
    settings: Arc<dyn SettingsStore>,
    target: WorldTarget,
    backups: Option<usize>,
}

impl Monitor {
    pub fn new(
        chain: TokenChain,
        realms: RealmsClient,
        reporter: PresenceReporter,
        settings: Arc<dyn SettingsStore>,
        target: WorldTarget,
    ) -> Self {
        Self {
            chain,
            realms,
            reporter,
            settings,
            target,
            backups: None,
        }
    }

    /// Look up the newest `count` backups on every run
    pub fn with_backups(mut self, count: usize) -> Self {
        self.backups = Some(count.max(1));
        self
    }

    /// Wire every component from the application config
    pub async fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let (bot_token, chat_id) = config.telegram_credentials()?;

        let settings = open_settings(config).await?;
        let chain = token_chain(config, settings.clone())?;
        let realms = RealmsClient::new(config.realms_config())?;
        let publisher = TelegramPublisher::new(bot_token, chat_id, config.http_timeout())?;
        let reporter = PresenceReporter::new(settings.clone(), Arc::new(publisher))
            .with_grace(config.grace())
            .with_utc_offset(config.presence.utc_offset_hours);

        let monitor = Self::new(
            chain,
            realms,
            reporter,
            settings,
            WorldTarget::from_config(config),
        );
        Ok(if config.backup.enabled {
            monitor.with_backups(config.backup.count)
        } else {
            monitor
        })
    }

    pub fn chain(&self) -> &TokenChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut TokenChain {
        &mut self.chain
    }

    /// One poll: authenticate, read the realm, publish who is online.
    ///
    /// Settings are only written after the status was published, so a
    /// failed run leaves no partial state behind.
    #[instrument(skip(self))]
    pub async fn run_once(&mut self) -> Result<RunReport, MonitorError> {
        let mut session = self.open_session().await?;

        let worlds = with_session!(self, session, |identity| self.realms.list_worlds(identity));
        let world = self.target.select(&worlds)?;
        debug!(world_id = world.id, "Selected realm");
        let world_id = world.id;

        let detail = with_session!(self, session, |identity| self
            .realms
            .get_world_detail(identity, world_id));
        let online = detail.online_players();
        info!("{} players online in {}", online.len(), detail.display_name());

        let backup = match self.backups {
            Some(count) => self.latest_backup(&mut session, &detail, count).await?,
            None => None,
        };

        self.reporter.report(&online, Utc::now()).await?;

        let backup_url = match backup {
            Some(BackupLink {
                backup_id,
                url,
                changed: true,
            }) => {
                self.settings
                    .set_many(&[
                        (BACKUP_ID_KEY.to_string(), backup_id),
                        (BACKUP_URL_KEY.to_string(), url.clone()),
                    ])
                    .await?;
                info!("Stored download link for the newest backup");
                Some(url)
            }
            Some(link) => Some(link.url),
            None => None,
        };

        Ok(RunReport {
            world: detail.display_name(),
            online,
            backup_url,
        })
    }

    async fn open_session(&mut self) -> Result<Session, MonitorError> {
        let mut token = self.chain.get_valid(CredentialKind::Minecraft).await?.token;
        let mut refreshed = false;

        let profile = loop {
            match self.realms.get_profile(&token).await {
                Err(e) if e.is_auth_expired() && !refreshed => {
                    warn!("Minecraft token rejected while reading the profile, forcing a refresh");
                    refreshed = true;
                    token = self.chain.force_refresh(CredentialKind::Minecraft).await?.token;
                }
                other => break other?,
            }
        };
        debug!(player = %profile.name, "Using Minecraft profile");

        Ok(Session {
            identity: RealmsIdentity::new(token, &profile),
            refreshed,
        })
    }

    async fn latest_backup(
        &mut self,
        session: &mut Session,
        detail: &WorldDetail,
        count: usize,
    ) -> Result<Option<BackupLink>, MonitorError> {
        let world_id = detail.id;
        let backups = with_session!(self, session, |identity| self
            .realms
            .latest_backups(identity, world_id, count));

        let Some(newest) = backups.into_iter().next() else {
            debug!("Realm has no backups");
            return Ok(None);
        };

        let known_id = self.settings.get(BACKUP_ID_KEY).await?;
        let known_url = self.settings.get(BACKUP_URL_KEY).await?;
        if let (Some(known_id), Some(url)) = (known_id, known_url)
            && known_id == newest.backup_id
        {
            debug!("Newest backup already recorded");
            return Ok(Some(BackupLink {
                backup_id: newest.backup_id,
                url,
                changed: false,
            }));
        }

        let slot = detail.active_slot.unwrap_or(1);
        let download = with_session!(self, session, |identity| self
            .realms
            .world_download(identity, world_id, slot));

        Ok(Some(BackupLink {
            backup_id: newest.backup_id,
            url: download.download_link,
            changed: true,
        }))
    }
}

struct BackupLink {
    backup_id: String,
    url: String,
    changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rw_auth::config::Endpoints;
    use rw_auth::{AuthConfig, CredentialRecord};
    use rw_core::MemorySettingsStore;
    use rw_presence::StatusPublisher;
    use rw_realms::RealmsConfig;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingPublisher {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatusPublisher for RecordingPublisher {
        async fn publish(&self, text: &str, previous: Option<i64>) -> rw_presence::Result<i64> {
            self.texts.lock().unwrap().push(text.to_string());
            Ok(previous.unwrap_or(1))
        }
    }

    struct Harness {
        server: MockServer,
        settings: MemorySettingsStore,
        publisher: Arc<RecordingPublisher>,
        monitor: Monitor,
    }

    async fn harness(target: WorldTarget) -> Harness {
        let server = MockServer::start().await;
        let base = server.uri();
        let endpoints = Endpoints {
            ms_authorize: format!("{base}/authorize"),
            ms_token: format!("{base}/token"),
            xbl_authenticate: format!("{base}/xbl"),
            xsts_authorize: format!("{base}/xsts"),
            mc_login: format!("{base}/mc"),
        };
        let settings = MemorySettingsStore::new();
        let shared: Arc<dyn SettingsStore> = Arc::new(settings.clone());

        let client = AuthClient::new(AuthConfig::default().with_endpoints(endpoints)).unwrap();
        let chain = TokenChain::new(client, CredentialStore::new(shared.clone()));
        let realms = RealmsClient::new(
            RealmsConfig::default().with_base_urls(base.clone(), format!("{base}/minecraft/profile")),
        )
        .unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let reporter = PresenceReporter::new(shared.clone(), publisher.clone());

        Harness {
            server,
            settings,
            publisher,
            monitor: Monitor::new(chain, realms, reporter, shared, target),
        }
    }

    async fn seed_tokens(harness: &Harness, mc_token: &str) {
        let store = harness.monitor.chain().store();
        store.put(&CredentialRecord::refresh_token("refresh")).await.unwrap();
        store
            .put(&CredentialRecord::expiring_in(CredentialKind::MicrosoftAccess, "ms", 3600))
            .await
            .unwrap();
        store
            .put(&CredentialRecord::expiring_in(CredentialKind::XboxLive, "xbl", 3600).with_user_hash("uhs"))
            .await
            .unwrap();
        store
            .put(&CredentialRecord::expiring_in(CredentialKind::Xsts, "xsts", 3600).with_user_hash("uhs"))
            .await
            .unwrap();
        store
            .put(&CredentialRecord::expiring_in(CredentialKind::Minecraft, mc_token, 3600))
            .await
            .unwrap();
    }

    fn cookie(token: &str) -> String {
        format!("sid=token:{token}:uuid-1; user=Steve; version=1.20.4")
    }

    async fn mount_profile(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/minecraft/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "uuid-1", "name": "Steve"})))
            .mount(server)
            .await;
    }

    async fn mount_worlds(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/worlds"))
            .and(header("Cookie", cookie(token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [
                    {"id": 1, "name": "Creative"},
                    {"id": 2, "name": "Survival"}
                ]
            })))
            .mount(server)
            .await;
    }

    async fn mount_detail(server: &MockServer, token: &str) {
        Mock::given(method("GET"))
            .and(path("/worlds/2"))
            .and(header("Cookie", cookie(token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 2,
                "name": "Survival",
                "activeSlot": 3,
                "players": [
                    {"name": "Carl", "online": true},
                    {"name": "Alice", "online": true},
                    {"name": "Bob", "online": false}
                ]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_run_publishes_online_players() {
        let mut h = harness(WorldTarget::Name("survival".to_string())).await;
        seed_tokens(&h, "mc").await;
        mount_profile(&h.server).await;
        mount_worlds(&h.server, "mc").await;
        mount_detail(&h.server, "mc").await;

        let report = h.monitor.run_once().await.unwrap();
        assert_eq!(report.world, "Survival");
        assert_eq!(report.online, vec!["Alice", "Carl"]);
        assert_eq!(report.backup_url, None);

        let texts = h.publisher.texts.lock().unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("*Online:* 2"));
    }

    #[tokio::test]
    async fn test_realms_rejection_refreshes_once_and_retries() {
        let mut h = harness(WorldTarget::Id(2)).await;
        seed_tokens(&h, "mc-old").await;
        mount_profile(&h.server).await;

        Mock::given(method("GET"))
            .and(path("/worlds"))
            .and(header("Cookie", cookie("mc-old").as_str()))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "mc-new", "expires_in": 86400})),
            )
            .expect(1)
            .mount(&h.server)
            .await;
        mount_worlds(&h.server, "mc-new").await;
        mount_detail(&h.server, "mc-new").await;

        let report = h.monitor.run_once().await.unwrap();
        assert_eq!(report.online, vec!["Alice", "Carl"]);
        assert_eq!(h.settings.get("mc_token").await.unwrap().as_deref(), Some("mc-new"));
    }

    #[tokio::test]
    async fn test_second_rejection_is_fatal() {
        let mut h = harness(WorldTarget::First).await;
        seed_tokens(&h, "mc-old").await;
        mount_profile(&h.server).await;

        Mock::given(method("GET"))
            .and(path("/worlds"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&h.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "mc-new", "expires_in": 86400})),
            )
            .expect(1)
            .mount(&h.server)
            .await;

        let error = h.monitor.run_once().await.unwrap_err();
        assert!(matches!(error, MonitorError::Realms(ref e) if e.is_auth_expired()));
        assert!(h.publisher.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_login_requires_login() {
        let mut h = harness(WorldTarget::First).await;

        let error = h.monitor.run_once().await.unwrap_err();
        assert!(error.requires_login());
        assert!(h.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_world() {
        let mut h = harness(WorldTarget::Id(99)).await;
        seed_tokens(&h, "mc").await;
        mount_profile(&h.server).await;
        mount_worlds(&h.server, "mc").await;

        let error = h.monitor.run_once().await.unwrap_err();
        assert!(matches!(error, MonitorError::TargetWorldMissing(_)));
        assert!(h.publisher.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_backup_link_is_stored_after_publish() {
        let h = harness(WorldTarget::Id(2)).await;
        seed_tokens(&h, "mc").await;
        let mut monitor = h.monitor.with_backups(1);
        mount_profile(&h.server).await;
        mount_worlds(&h.server, "mc").await;
        mount_detail(&h.server, "mc").await;

        Mock::given(method("GET"))
            .and(path("/worlds/2/backups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "backups": [
                    {"backupId": "b-1", "lastModifiedDate": 1000, "size": 10},
                    {"backupId": "b-2", "lastModifiedDate": 2000, "size": 20}
                ]
            })))
            .expect(2)
            .mount(&h.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/worlds/2/slot/3/download"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "downloadLink": "https://download.example/b-2"
            })))
            .expect(1)
            .mount(&h.server)
            .await;

        let report = monitor.run_once().await.unwrap();
        assert_eq!(report.backup_url.as_deref(), Some("https://download.example/b-2"));
        assert_eq!(h.settings.get(BACKUP_ID_KEY).await.unwrap().as_deref(), Some("b-2"));

        // Unchanged backup reuses the stored link
        let report = monitor.run_once().await.unwrap();
        assert_eq!(report.backup_url.as_deref(), Some("https://download.example/b-2"));
    }

    #[test]
    fn test_target_selection() {
        let worlds = vec![
            WorldSummary {
                id: 1,
                name: Some("Creative".to_string()),
                owner: None,
                state: None,
                expired: false,
                active_slot: None,
            },
            WorldSummary {
                id: 2,
                name: Some("Survival".to_string()),
                owner: None,
                state: None,
                expired: false,
                active_slot: None,
            },
        ];

        assert_eq!(WorldTarget::First.select(&worlds).unwrap().id, 1);
        assert_eq!(WorldTarget::Id(2).select(&worlds).unwrap().id, 2);
        assert_eq!(WorldTarget::Name("SURVIVAL".to_string()).select(&worlds).unwrap().id, 2);
        assert!(matches!(
            WorldTarget::First.select(&[]),
            Err(MonitorError::NoWorlds)
        ));
    }
}
