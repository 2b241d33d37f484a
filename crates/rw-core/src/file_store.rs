use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tokio::fs;
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::store::SettingsStore;

const LOCK_ATTEMPTS: u32 = 40;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// File-based settings store
///
/// Keeps every setting in one JSON object. Writers take an advisory lock,
/// reload the file, apply their change and atomically replace the file, so
/// concurrent processes never observe a half-written table and the last
/// writer of a key wins.
///
/// # Directory Structure
/// ```text
/// ~/.local/share/realm-watch/
/// ├── settings.json          # All settings
/// └── settings.lock          # Advisory lock file
/// ```
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
    lock_file: PathBuf,
}

impl FileSettingsStore {
    /// Open (or lazily create) the settings file at `path`
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let lock_file = path.with_extension("lock");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o700);
                std::fs::set_permissions(parent, perms).map_err(|e| StorageError::io(parent, e))?;
            }
        }

        Ok(Self { path, lock_file })
    }

    /// Get default settings path for the current platform
    pub fn default_path() -> Result<PathBuf, StorageError> {
        let project_dirs = directories::ProjectDirs::from("", "", "realm-watch")
            .ok_or(StorageError::ProjectDirectoriesUnavailable)?;

        Ok(project_dirs.data_dir().join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire an exclusive lock on the settings file, retrying briefly
    async fn acquire_lock(&self) -> Result<std::fs::File, StorageError> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)
            .map_err(|e| StorageError::io(&self.lock_file, e))?;

        for attempt in 1..=LOCK_ATTEMPTS {
            if lock_file.try_lock_exclusive().is_ok() {
                return Ok(lock_file);
            }
            debug!("Settings lock busy (attempt {}/{})", attempt, LOCK_ATTEMPTS);
            tokio::time::sleep(LOCK_RETRY_DELAY).await;
        }

        warn!("Giving up on settings lock {}", self.lock_file.display());
        Err(StorageError::LockTimeout)
    }

    async fn load_from_disk(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Corrupted {
            path: self.path.clone(),
            source,
        })
    }

    async fn save_to_disk(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(values).map_err(|source| StorageError::Corrupted {
            path: self.path.clone(),
            source,
        })?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&temp_path)
            .map_err(|e| StorageError::io(&temp_path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| StorageError::io(&temp_path, e))?;
        file.sync_all().map_err(|e| StorageError::io(&temp_path, e))?;

        // A leftover temp file keeps its old mode, so enforce it again
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            file.set_permissions(perms)
                .map_err(|e| StorageError::io(&temp_path, e))?;
        }
        drop(file);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))?;

        Ok(())
    }

    /// Read-modify-write under the lock
    async fn update<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let _lock = self.acquire_lock().await?;

        let mut values = self.load_from_disk().await?;
        apply(&mut values);
        self.save_to_disk(&values).await
    }
}

#[async_trait::async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load_from_disk().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.update(|values| {
            values.remove(key);
        })
        .await
    }

    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StorageError> {
        self.update(|values| {
            for (key, value) in entries {
                values.insert(key.clone(), value.clone());
            }
        })
        .await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        self.update(|values| {
            for key in keys {
                values.remove(key);
            }
        })
        .await
    }
}
