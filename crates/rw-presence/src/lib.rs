//! Player presence publishing.
//!
//! [`PresenceReporter`] tracks how long each player has been online, renders
//! a Markdown status block and hands it to a [`StatusPublisher`], by default
//! a single pinned Telegram message that is edited in place.

pub mod errors;
pub mod format;
pub mod reporter;
pub mod telegram;
pub mod tracker;

pub use errors::{PresenceError, Result};
pub use format::render_status;
pub use reporter::{MESSAGE_ID_KEY, PresenceReporter, PublishedStatus};
pub use telegram::{StatusPublisher, TelegramPublisher};
pub use tracker::{DEFAULT_GRACE, PlayerSession, PresenceTracker, SESSIONS_KEY};
