//! Ephemeral session storage shared between the editor and preview views.
//!
//! [`SessionStorage`] is a cloneable key/value handle with a byte quota, the
//! way browser session storage behaves. It can optionally mirror its contents
//! to a JSON file so a session survives a process restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Key holding the serialized scene snapshot.
pub const CANVAS_STATE_KEY: &str = "canvasState";

/// Key holding the exported preview image as a data URL.
pub const PREVIEW_IMAGE_KEY: &str = "previewImage";

/// Key holding the id of the layout being edited.
pub const LAYOUT_ID_KEY: &str = "layoutId";

/// Default storage capacity in bytes.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// File name used when mirroring storage to disk.
const STORAGE_FILE: &str = "session-storage.json";

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Writing the value would exceed the storage capacity.
    #[error("Storage quota exceeded writing {key}: {required} bytes needed, {quota} available")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Total bytes the storage would hold after the write.
        required: usize,
        /// Storage capacity.
        quota: usize,
    },
    /// An I/O error occurred while mirroring to disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The on-disk mirror could not be parsed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Default)]
struct StorageInner {
    entries: HashMap<String, String>,
    used_bytes: usize,
}

/// Quota-limited key/value session storage.
///
/// # Example
///
/// ```
/// use collage_core::storage::{SessionStorage, LAYOUT_ID_KEY};
///
/// let storage = SessionStorage::new();
/// storage.set_item(LAYOUT_ID_KEY, "vertical").unwrap();
/// assert_eq!(storage.get_item(LAYOUT_ID_KEY).as_deref(), Some("vertical"));
/// ```
#[derive(Debug, Clone)]
pub struct SessionStorage {
    inner: Arc<RwLock<StorageInner>>,
    quota_bytes: usize,
    data_dir: Option<PathBuf>,
}

impl Default for SessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStorage {
    /// Create an in-memory storage with the default quota.
    #[must_use]
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA_BYTES)
    }

    /// Create an in-memory storage with a custom quota.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StorageInner::default())),
            quota_bytes,
            data_dir: None,
        }
    }

    /// Create a storage mirrored to `data_dir`, loading any existing contents.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created or read,
    /// [`StorageError::Serialization`] if an existing mirror is malformed, and
    /// [`StorageError::QuotaExceeded`] if the mirror holds more than `quota_bytes`.
    pub fn with_data_dir(
        data_dir: impl Into<PathBuf>,
        quota_bytes: usize,
    ) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let path = data_dir.join(STORAGE_FILE);
        let mut inner = StorageInner::default();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            inner.used_bytes = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
            if inner.used_bytes > quota_bytes {
                tracing::warn!(
                    "Session mirror {} holds {} bytes, over the {quota_bytes} byte quota",
                    path.display(),
                    inner.used_bytes
                );
                return Err(StorageError::QuotaExceeded {
                    key: STORAGE_FILE.to_string(),
                    required: inner.used_bytes,
                    quota: quota_bytes,
                });
            }
            inner.entries = entries;
            tracing::debug!(
                "Loaded {} session entries from {}",
                inner.entries.len(),
                path.display()
            );
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            quota_bytes,
            data_dir: Some(data_dir),
        })
    }

    /// Storage capacity in bytes.
    #[must_use]
    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    /// Bytes currently used by keys and values.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.read().used_bytes
    }

    /// Read a value.
    #[must_use]
    pub fn get_item(&self, key: &str) -> Option<String> {
        self.read().entries.get(key).cloned()
    }

    /// Write a value, replacing any previous one.
    ///
    /// The write is all-or-nothing: on error the previous value is kept.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QuotaExceeded`] if the storage would exceed its quota.
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut inner = self.write();
            let previous = inner.entries.get(key).map_or(0, |v| entry_size(key, v));
            let required = inner.used_bytes - previous + entry_size(key, value);
            if required > self.quota_bytes {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    required,
                    quota: self.quota_bytes,
                });
            }
            inner.entries.insert(key.to_string(), value.to_string());
            inner.used_bytes = required;
        }
        self.persist();
        Ok(())
    }

    /// Remove a value, returning it if present.
    pub fn remove_item(&self, key: &str) -> Option<String> {
        let removed = {
            let mut inner = self.write();
            let removed = inner.entries.remove(key);
            if let Some(ref value) = removed {
                inner.used_bytes -= entry_size(key, value);
            }
            removed
        };
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Remove every value.
    pub fn clear(&self) {
        {
            let mut inner = self.write();
            inner.entries.clear();
            inner.used_bytes = 0;
        }
        self.persist();
    }

    /// Mirror the entries to disk. No-op without a data directory.
    fn persist(&self) {
        let Some(ref data_dir) = self.data_dir else {
            return;
        };
        let json = match serde_json::to_string(&self.read().entries) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to serialize session storage: {e}");
                return;
            }
        };
        let path = data_dir.join(STORAGE_FILE);
        if let Err(e) = std::fs::write(&path, json) {
            tracing::warn!("Failed to persist session storage to {}: {e}", path.display());
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StorageInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StorageInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let storage = SessionStorage::new();
        assert!(storage.get_item(CANVAS_STATE_KEY).is_none());

        storage.set_item(CANVAS_STATE_KEY, "{}").expect("set");
        assert_eq!(storage.get_item(CANVAS_STATE_KEY).as_deref(), Some("{}"));
        assert_eq!(storage.used_bytes(), CANVAS_STATE_KEY.len() + 2);

        assert_eq!(storage.remove_item(CANVAS_STATE_KEY).as_deref(), Some("{}"));
        assert_eq!(storage.used_bytes(), 0);
    }

    #[test]
    fn test_quota_rejects_and_keeps_previous_value() {
        let storage = SessionStorage::with_quota(32);
        storage.set_item("k", "small").expect("fits");

        let big = "x".repeat(64);
        let err = storage.set_item("k", &big).expect_err("should exceed quota");
        assert!(matches!(err, StorageError::QuotaExceeded { quota: 32, .. }));
        assert_eq!(storage.get_item("k").as_deref(), Some("small"));
    }

    #[test]
    fn test_overwrite_accounts_for_previous_value() {
        let storage = SessionStorage::with_quota(10);
        storage.set_item("k", "123456789").expect("fits exactly");
        storage.set_item("k", "987654321").expect("replacement fits");
        assert_eq!(storage.used_bytes(), 10);
    }

    #[test]
    fn test_clones_share_entries() {
        let storage = SessionStorage::new();
        let other = storage.clone();
        storage.set_item(LAYOUT_ID_KEY, "horizontal").expect("set");
        assert_eq!(other.get_item(LAYOUT_ID_KEY).as_deref(), Some("horizontal"));
        other.clear();
        assert!(storage.get_item(LAYOUT_ID_KEY).is_none());
    }

    #[test]
    fn test_persistence_across_recreation() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let storage = SessionStorage::with_data_dir(dir.path(), DEFAULT_QUOTA_BYTES)
                .expect("storage");
            storage.set_item(LAYOUT_ID_KEY, "cinema-poster").expect("set");
        }

        let storage =
            SessionStorage::with_data_dir(dir.path(), DEFAULT_QUOTA_BYTES).expect("reload");
        assert_eq!(
            storage.get_item(LAYOUT_ID_KEY).as_deref(),
            Some("cinema-poster")
        );
        assert_eq!(storage.used_bytes(), LAYOUT_ID_KEY.len() + "cinema-poster".len());
    }

    #[test]
    fn test_oversized_mirror_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let storage = SessionStorage::with_data_dir(dir.path(), DEFAULT_QUOTA_BYTES)
                .expect("storage");
            storage.set_item(CANVAS_STATE_KEY, &"x".repeat(100)).expect("set");
        }

        let err = SessionStorage::with_data_dir(dir.path(), 50).expect_err("over quota");
        assert!(matches!(
            err,
            StorageError::QuotaExceeded { quota: 50, required, .. }
                if required == CANVAS_STATE_KEY.len() + 100
        ));
        assert!(SessionStorage::with_data_dir(dir.path(), 200).is_ok());
    }
}
