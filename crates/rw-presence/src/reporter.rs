use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rw_core::SettingsStore;
use tracing::{info, instrument, warn};

use crate::errors::Result;
use crate::format::render_status;
use crate::telegram::StatusPublisher;
use crate::tracker::PresenceTracker;

/// Setting holding the id of the status message
pub const MESSAGE_ID_KEY: &str = "realm_status_message_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedStatus {
    pub message_id: i64,
    pub text: String,
}

/// Turns an online player list into a published status message.
///
/// Session bookkeeping and the message id are only persisted once the
/// publisher accepted the new text.
#[derive(Clone)]
pub struct PresenceReporter {
    settings: Arc<dyn SettingsStore>,
    publisher: Arc<dyn StatusPublisher>,
    grace: TimeDelta,
    utc_offset_hours: i32,
}

impl PresenceReporter {
    pub fn new(settings: Arc<dyn SettingsStore>, publisher: Arc<dyn StatusPublisher>) -> Self {
        Self {
            settings,
            publisher,
            grace: crate::tracker::DEFAULT_GRACE,
            utc_offset_hours: 3,
        }
    }

    pub fn with_grace(mut self, grace: TimeDelta) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_utc_offset(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    #[instrument(skip(self), fields(online = players.len()))]
    pub async fn report(&self, players: &[String], now: DateTime<Utc>) -> Result<PublishedStatus> {
        let mut tracker = PresenceTracker::load(self.settings.as_ref(), self.grace).await?;
        tracker.observe(players, now);

        let text = render_status(players, &tracker, now, self.utc_offset_hours);
        let previous = self.previous_message_id().await?;
        let message_id = self.publisher.publish(&text, previous).await?;

        tracker.save(self.settings.as_ref()).await?;
        if previous != Some(message_id) {
            self.settings
                .set(MESSAGE_ID_KEY, &message_id.to_string())
                .await?;
        }

        info!("Published status for {} players", players.len());
        Ok(PublishedStatus { message_id, text })
    }

    async fn previous_message_id(&self) -> Result<Option<i64>> {
        let Some(raw) = self.settings.get(MESSAGE_ID_KEY).await? else {
            return Ok(None);
        };

        match raw.trim().parse() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                warn!("Ignoring malformed status message id {:?}", raw);
                Ok(None)
            }
        }
    }
}
