//! Read-only Minecraft Realms client.
//!
//! Realms authenticates with a session cookie derived from the Minecraft
//! services token and the owning profile:
//! `sid=token:<token>:<uuid>; user=<name>; version=<client version>`.

pub mod client;
pub mod config;
pub mod errors;
pub mod models;

pub use client::{RealmsClient, RealmsIdentity};
pub use config::RealmsConfig;
pub use errors::{RealmsError, Result};
pub use models::{Backup, McProfile, WorldDetail, WorldDownload, WorldPlayer, WorldSummary};
