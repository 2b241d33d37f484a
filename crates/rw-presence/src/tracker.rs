use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeDelta, Utc};
use rw_core::SettingsStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;

/// Setting holding the serialized sessions
pub const SESSIONS_KEY: &str = "realm_player_sessions";

/// How long a departed player keeps their session
pub const DEFAULT_GRACE: TimeDelta = TimeDelta::minutes(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSession {
    pub started_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Missing from the most recent poll
    #[serde(default)]
    pub away: bool,
}

impl PlayerSession {
    pub fn starting(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            last_seen: now,
            away: false,
        }
    }

    pub fn played(&self, now: DateTime<Utc>) -> TimeDelta {
        (now - self.started_at).max(TimeDelta::zero())
    }
}

/// Per-player play sessions.
///
/// A player who drops off and comes back within the grace window keeps
/// the original `started_at`, so short disconnects do not reset the
/// displayed play time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTracker {
    sessions: BTreeMap<String, PlayerSession>,
    grace: TimeDelta,
}

impl PresenceTracker {
    pub fn new(grace: TimeDelta) -> Self {
        Self {
            sessions: BTreeMap::new(),
            grace,
        }
    }

    pub fn grace(&self) -> TimeDelta {
        self.grace
    }

    pub fn session(&self, name: &str) -> Option<&PlayerSession> {
        self.sessions.get(name)
    }

    pub fn sessions(&self) -> &BTreeMap<String, PlayerSession> {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Record the players online at `now`.
    ///
    /// Players present in consecutive polls keep their session however far
    /// apart the polls are. The grace window only applies once a player has
    /// been missing from a poll.
    pub fn observe(&mut self, players: &[String], now: DateTime<Utc>) {
        let grace = self.grace;
        let present: BTreeSet<&str> = players.iter().map(String::as_str).collect();

        self.sessions.retain(|name, session| {
            if present.contains(name.as_str()) {
                return true;
            }
            session.away = true;
            let keep = now - session.last_seen <= grace;
            if !keep {
                debug!(player = %name, "Session ended");
            }
            keep
        });

        for name in players {
            self.sessions
                .entry(name.clone())
                .and_modify(|session| {
                    if session.away && now - session.last_seen > grace {
                        *session = PlayerSession::starting(now);
                    } else {
                        session.last_seen = now;
                        session.away = false;
                    }
                })
                .or_insert_with(|| PlayerSession::starting(now));
        }
    }

    /// Load from settings; unreadable data starts a fresh tracker
    pub async fn load(settings: &dyn SettingsStore, grace: TimeDelta) -> Result<Self> {
        let mut tracker = Self::new(grace);

        if let Some(raw) = settings.get(SESSIONS_KEY).await? {
            match serde_json::from_str(&raw) {
                Ok(sessions) => tracker.sessions = sessions,
                Err(e) => warn!("Discarding unreadable player sessions: {}", e),
            }
        }

        Ok(tracker)
    }

    pub async fn save(&self, settings: &dyn SettingsStore) -> Result<()> {
        if self.sessions.is_empty() {
            settings.delete(SESSIONS_KEY).await?;
        } else {
            settings
                .set(SESSIONS_KEY, &serde_json::to_string(&self.sessions)?)
                .await?;
        }
        Ok(())
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rw_core::MemorySettingsStore;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + TimeDelta::minutes(minute)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_player_starts_session() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Alice"]), at(0));

        assert_eq!(tracker.session("Alice"), Some(&PlayerSession::starting(at(0))));
    }

    #[test]
    fn test_continuing_player_keeps_start() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Alice"]), at(0));
        tracker.observe(&names(&["Alice"]), at(5));

        let session = tracker.session("Alice").unwrap();
        assert_eq!(session.started_at, at(0));
        assert_eq!(session.last_seen, at(5));
        assert_eq!(session.played(at(5)), TimeDelta::minutes(5));
    }

    #[test]
    fn test_absent_player_kept_within_grace() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Alice", "Bob"]), at(0));
        tracker.observe(&names(&["Alice"]), at(10));

        assert!(tracker.session("Bob").is_some());

        // Bob returns inside the window and resumes
        tracker.observe(&names(&["Alice", "Bob"]), at(10));
        assert_eq!(tracker.session("Bob").unwrap().started_at, at(0));
    }

    #[test]
    fn test_present_player_keeps_start_across_long_gap() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Alice"]), at(0));
        tracker.observe(&names(&["Alice"]), at(15));

        let session = tracker.session("Alice").unwrap();
        assert_eq!(session.started_at, at(0));
        assert_eq!(session.last_seen, at(15));
        assert_eq!(session.played(at(15)), TimeDelta::minutes(15));
    }

    #[test]
    fn test_return_after_window_restarts() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Bob"]), at(0));
        tracker.observe(&[], at(5));
        assert!(tracker.session("Bob").unwrap().away);

        tracker.observe(&names(&["Bob"]), at(20));
        assert_eq!(tracker.session("Bob"), Some(&PlayerSession::starting(at(20))));
    }

    #[test]
    fn test_absent_player_dropped_after_grace() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Alice", "Bob"]), at(0));
        tracker.observe(&names(&["Alice"]), at(11));

        assert!(tracker.session("Bob").is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_returning_after_grace_restarts() {
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Bob"]), at(0));
        tracker.observe(&[], at(30));
        assert!(tracker.is_empty());

        tracker.observe(&names(&["Bob"]), at(31));
        assert_eq!(tracker.session("Bob").unwrap().started_at, at(31));
    }

    #[tokio::test]
    async fn test_persistence() {
        let settings = MemorySettingsStore::new();
        let mut tracker = PresenceTracker::default();
        tracker.observe(&names(&["Alice"]), at(0));
        tracker.save(&settings).await.unwrap();

        let loaded = PresenceTracker::load(&settings, DEFAULT_GRACE).await.unwrap();
        assert_eq!(loaded, tracker);

        tracker.observe(&[], at(60));
        tracker.save(&settings).await.unwrap();
        assert_eq!(settings.get(SESSIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreadable_sessions_are_discarded() {
        let settings = MemorySettingsStore::new();
        settings.set(SESSIONS_KEY, "{\"Alice\": 1700000000}").await.unwrap();

        let tracker = PresenceTracker::load(&settings, DEFAULT_GRACE).await.unwrap();
        assert!(tracker.is_empty());
    }
}
