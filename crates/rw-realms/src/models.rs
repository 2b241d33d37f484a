use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Minecraft profile response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McProfile {
    /// UUID without dashes
    pub id: String,
    /// Player name
    pub name: String,
}

/// `GET /worlds`
#[derive(Debug, Clone, Deserialize)]
pub struct WorldList {
    #[serde(default)]
    pub servers: Vec<WorldSummary>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorldSummary {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub active_slot: Option<u32>,
}

/// `GET /worlds/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldDetail {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub motd: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub active_slot: Option<u32>,
    #[serde(default)]
    pub max_players: Option<u32>,
    /// Null for worlds the caller cannot inspect
    #[serde(default)]
    pub players: Option<Vec<WorldPlayer>>,
}

impl WorldDetail {
    /// Online player names, sorted and de-duplicated
    pub fn online_players(&self) -> Vec<String> {
        self.players
            .iter()
            .flatten()
            .filter(|player| player.online && !player.name.is_empty())
            .map(|player| player.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Realm {}", self.id))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorldPlayer {
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub operator: bool,
}

/// `GET /worlds/{id}/backups`
#[derive(Debug, Clone, Deserialize)]
pub struct BackupList {
    #[serde(default)]
    pub backups: Vec<Backup>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub backup_id: String,
    /// Milliseconds since the unix epoch
    pub last_modified_date: i64,
    #[serde(default)]
    pub size: u64,
}

/// `GET /worlds/{id}/slot/{slot}/download`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorldDownload {
    pub download_link: String,
    #[serde(default)]
    pub resource_pack_url: Option<String>,
    #[serde(default)]
    pub resource_pack_hash: Option<String>,
}
