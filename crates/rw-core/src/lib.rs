//! Durable key/value settings shared by the realm-watch crates.
//!
//! Credentials, the presence bookkeeping and the last published message id
//! all live in one flat `key -> string` table. Two backends are provided:
//!
//! - [`MemorySettingsStore`] for tests and throwaway runs
//! - [`FileSettingsStore`] for production, a single JSON file updated with
//!   an advisory lock and an atomic rename
//!
//! # Example
//!
//! ```
//! use rw_core::{MemorySettingsStore, SettingsStore};
//!
//! # async fn example() -> Result<(), rw_core::StorageError> {
//! let settings = MemorySettingsStore::new();
//! settings.set("realm_status_message_id", "42").await?;
//!
//! assert_eq!(
//!     settings.get("realm_status_message_id").await?.as_deref(),
//!     Some("42")
//! );
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```

pub mod errors;
pub mod file_store;
pub mod store;

pub use errors::StorageError;
pub use file_store::FileSettingsStore;
pub use store::{MemorySettingsStore, SettingsStore};
