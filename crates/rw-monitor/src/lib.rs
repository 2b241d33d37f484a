//! Realm watching: one [`Monitor::run_once`] call authenticates through the
//! Microsoft → Xbox Live → XSTS → Minecraft chain, reads the configured
//! realm and publishes who is online.

pub mod config;
pub mod driver;

pub use config::{ConfigError, MonitorConfig};
pub use driver::{
    BACKUP_ID_KEY, BACKUP_URL_KEY, Monitor, MonitorError, RunReport, WorldTarget, open_settings,
    token_chain,
};
