use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::RealmsConfig;
use crate::errors::{RealmsError, Result};
use crate::models::*;

/// Who is calling Realms: the Minecraft token plus the profile it belongs to
#[derive(Clone, PartialEq, Eq)]
pub struct RealmsIdentity {
    pub access_token: String,
    pub uuid: String,
    pub name: String,
}

impl RealmsIdentity {
    pub fn new(access_token: impl Into<String>, profile: &McProfile) -> Self {
        Self {
            access_token: access_token.into(),
            uuid: profile.id.clone(),
            name: profile.name.clone(),
        }
    }
}

impl std::fmt::Debug for RealmsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmsIdentity")
            .field("access_token", &"[REDACTED]")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .finish()
    }
}

/// Read-only Realms API client.
///
/// Every call is a single request; a rejected session surfaces as
/// [`RealmsError::AuthExpired`] and is never retried here.
#[derive(Debug, Clone)]
pub struct RealmsClient {
    config: RealmsConfig,
    http: Client,
}

impl RealmsClient {
    pub fn new(config: RealmsConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_deref().unwrap_or("realm-watch"))
            .build()?;

        Ok(Self { config, http })
    }

    /// Fetch the Minecraft profile owning `mc_access_token`
    #[instrument(skip(self, mc_access_token))]
    pub async fn get_profile(&self, mc_access_token: &str) -> Result<McProfile> {
        debug!("Fetching Minecraft profile");
        let response = self
            .http
            .get(&self.config.profile_url)
            .header(AUTHORIZATION, format!("Bearer {}", mc_access_token))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RealmsError::ProfileNotFound);
        }

        Ok(checked(response).await?.json().await?)
    }

    /// Whether Realms is available to this account
    #[instrument(skip(self, identity), fields(player = %identity.name))]
    pub async fn check_available(&self, identity: &RealmsIdentity) -> Result<bool> {
        self.get_json(identity, "/mco/available").await
    }

    #[instrument(skip(self, identity), fields(player = %identity.name))]
    pub async fn list_worlds(&self, identity: &RealmsIdentity) -> Result<Vec<WorldSummary>> {
        let list: WorldList = self.get_json(identity, "/worlds").await?;
        debug!("Found {} realms", list.servers.len());
        Ok(list.servers)
    }

    #[instrument(skip(self, identity), fields(player = %identity.name))]
    pub async fn get_world_detail(&self, identity: &RealmsIdentity, world_id: i64) -> Result<WorldDetail> {
        self.get_json(identity, &format!("/worlds/{}", world_id))
            .await
            .map_err(|e| not_found_as(e, world_id))
    }

    /// Up to `count` backups of a world, newest first
    #[instrument(skip(self, identity), fields(player = %identity.name))]
    pub async fn latest_backups(
        &self,
        identity: &RealmsIdentity,
        world_id: i64,
        count: usize,
    ) -> Result<Vec<Backup>> {
        let list: BackupList = self
            .get_json(identity, &format!("/worlds/{}/backups", world_id))
            .await
            .map_err(|e| not_found_as(e, world_id))?;

        let mut backups = list.backups;
        backups.sort_by(|a, b| b.last_modified_date.cmp(&a.last_modified_date));
        backups.truncate(count);
        Ok(backups)
    }

    /// Download link for the world stored in `slot`
    #[instrument(skip(self, identity), fields(player = %identity.name))]
    pub async fn world_download(
        &self,
        identity: &RealmsIdentity,
        world_id: i64,
        slot: u32,
    ) -> Result<WorldDownload> {
        self.get_json(identity, &format!("/worlds/{}/slot/{}/download", world_id, slot))
            .await
            .map_err(|e| not_found_as(e, world_id))
    }

    async fn get_json<T: DeserializeOwned>(&self, identity: &RealmsIdentity, route: &str) -> Result<T> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), route);
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .header(COOKIE, self.session_cookie(identity))
            .send()
            .await?;

        Ok(checked(response).await?.json().await?)
    }

    fn session_cookie(&self, identity: &RealmsIdentity) -> String {
        format!(
            "sid=token:{}:{}; user={}; version={}",
            identity.access_token, identity.uuid, identity.name, self.config.client_version
        )
    }
}

async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RealmsError::AuthExpired(status));
    }

    let body = response.text().await.unwrap_or_default();
    Err(RealmsError::Http {
        status,
        body_snippet: body.chars().take(200).collect(),
    })
}

fn not_found_as(error: RealmsError, world_id: i64) -> RealmsError {
    match error {
        RealmsError::Http { status, .. } if status == StatusCode::NOT_FOUND => {
            RealmsError::WorldNotFound(world_id)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COOKIE_VALUE: &str = "sid=token:mc-token:uuid-1; user=Steve; version=1.20.4";

    fn client_for(server: &MockServer) -> RealmsClient {
        let config = RealmsConfig::default()
            .with_base_urls(server.uri(), format!("{}/minecraft/profile", server.uri()));
        RealmsClient::new(config).unwrap()
    }

    fn identity() -> RealmsIdentity {
        RealmsIdentity::new(
            "mc-token",
            &McProfile {
                id: "uuid-1".to_string(),
                name: "Steve".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_get_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/minecraft/profile"))
            .and(header("Authorization", "Bearer mc-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "uuid-1",
                "name": "Steve",
                "skins": [],
                "capes": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = client_for(&server).get_profile("mc-token").await.unwrap();
        assert_eq!(profile.id, "uuid-1");
        assert_eq!(profile.name, "Steve");
    }

    #[tokio::test]
    async fn test_profile_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/minecraft/profile"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client_for(&server).get_profile("mc-token").await;
        assert!(matches!(result, Err(RealmsError::ProfileNotFound)));
    }

    #[tokio::test]
    async fn test_session_cookie_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worlds"))
            .and(header("Cookie", COOKIE_VALUE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": 11, "name": "Survival", "state": "OPEN"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let worlds = client_for(&server).list_worlds(&identity()).await.unwrap();
        assert_eq!(worlds.len(), 1);
        assert_eq!(worlds[0].id, 11);
    }

    #[tokio::test]
    async fn test_unauthorized_signals_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worlds/11"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let error = client_for(&server)
            .get_world_detail(&identity(), 11)
            .await
            .unwrap_err();
        assert!(error.is_auth_expired());
    }

    #[tokio::test]
    async fn test_server_error_is_not_auth_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worlds"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let error = client_for(&server).list_worlds(&identity()).await.unwrap_err();
        assert!(!error.is_auth_expired());
        assert!(matches!(error, RealmsError::Http { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_world_detail_online_players() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worlds/11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 11,
                "name": "Survival",
                "activeSlot": 1,
                "players": [
                    {"name": "Alice", "online": true},
                    {"name": "Bob", "online": false},
                    {"name": "Carl", "online": true}
                ]
            })))
            .mount(&server)
            .await;

        let detail = client_for(&server)
            .get_world_detail(&identity(), 11)
            .await
            .unwrap();
        assert_eq!(detail.online_players(), vec!["Alice", "Carl"]);
    }

    #[tokio::test]
    async fn test_missing_world() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worlds/99"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client_for(&server).get_world_detail(&identity(), 99).await;
        assert!(matches!(result, Err(RealmsError::WorldNotFound(99))));
    }

    #[tokio::test]
    async fn test_latest_backups_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worlds/11/backups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "backups": [
                    {"backupId": "old", "lastModifiedDate": 1000, "size": 1},
                    {"backupId": "newest", "lastModifiedDate": 3000, "size": 3},
                    {"backupId": "middle", "lastModifiedDate": 2000, "size": 2}
                ]
            })))
            .mount(&server)
            .await;

        let backups = client_for(&server)
            .latest_backups(&identity(), 11, 2)
            .await
            .unwrap();
        let ids: Vec<_> = backups.iter().map(|b| b.backup_id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "middle"]);
    }

    #[tokio::test]
    async fn test_world_download_and_availability() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/worlds/11/slot/1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "downloadLink": "https://download.example/world.tar.gz",
                "resourcePackUrl": null,
                "resourcePackHash": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/mco/available"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let download = client.world_download(&identity(), 11, 1).await.unwrap();
        assert_eq!(download.download_link, "https://download.example/world.tar.gz");
        assert!(client.check_available(&identity()).await.unwrap());
    }
}
