//! Client-held region preference.
//!
//! The preference lives in whatever key-value storage the client offers (cookies,
//! local storage). Reads are lenient: anything that is not a known region is treated
//! as "no preference". Writes validate first and report failures as [`StorageError`]
//! so callers can log them and keep going with in-memory state.

use crate::regions::Region;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

pub const REGION_PREFERENCE_KEY: &str = "region-preference";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage is disabled or cannot be reached.
    Unavailable(String),
    QuotaExceeded {
        key: String,
        len: usize,
        limit: usize,
    },
    /// A stored value exists but cannot be decoded.
    Corrupt { key: String, reason: String },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Unavailable(reason) => write!(f, "Storage unavailable: {}", reason),
            StorageError::QuotaExceeded { key, len, limit } => write!(
                f,
                "Storage quota exceeded writing {}: {} bytes, limit {}",
                key, len, limit
            ),
            StorageError::Corrupt { key, reason } => {
                write!(f, "Stored value for {} is corrupt: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Minimal key-value storage the preference layer needs.
///
/// Each `set_item` must replace the value atomically: a concurrent `get_item` sees the old
/// value or the new one, never a mix.
pub trait PreferenceStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: PreferenceStorage + ?Sized> PreferenceStorage for &S {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

/// In-process storage with an optional byte quota and an off switch.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
    disabled: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes (keys plus values) the storage accepts.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Storage that fails every operation, like a browser with storage turned off.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        if self.disabled {
            return Err(StorageError::Unavailable("storage is disabled".to_string()));
        }
        self.items
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
    }
}

impl PreferenceStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.lock()?;
        if let Some(limit) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let len = used + key.len() + value.len();
            if len > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    len,
                    limit,
                });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Region preference on top of a [`PreferenceStorage`].
#[derive(Debug)]
pub struct RegionPreferenceStore<S> {
    storage: S,
}

impl<S: PreferenceStorage> RegionPreferenceStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Stored region, or `None` when unset, unreadable or not a known region.
    pub fn get_stored_preference(&self) -> Option<Region> {
        let raw = match self.storage.get_item(REGION_PREFERENCE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read region preference");
                return None;
            }
        };
        match Region::from_str(&raw) {
            Ok(region) => Some(region),
            Err(_) => {
                tracing::debug!(value = %raw, "Ignoring invalid stored region preference");
                None
            }
        }
    }

    pub fn set_stored_preference(&self, region: Region) -> Result<(), StorageError> {
        self.storage.set_item(REGION_PREFERENCE_KEY, region.code())
    }

    pub fn clear_stored_preference(&self) -> Result<(), StorageError> {
        self.storage.remove_item(REGION_PREFERENCE_KEY)
    }
}
