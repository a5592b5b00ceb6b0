use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;
use vitrine_core::re_exports::serde::de::DeserializeOwned;
use vitrine_core::re_exports::serde_json::Value;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::re_exports::uuid::Uuid;
use vitrine_core::schema::SettingsMap;
use vitrine_core::schema::setting_keys;
use vitrine_core::stuff::api_error::ApiError;

use crate::backend::SettingRecord;
use crate::backend::SettingsBackend;

/// Maximum length of a settings key in bytes
const MAX_KEY_LENGTH: usize = 255;

/// Caches all settings in memory and writes through to a [`SettingsBackend`].
///
/// Reads are served from the cached [`SettingsSnapshot`].
/// Every successful [`SettingsStore::upsert`] replaces the snapshot before it returns,
/// so a caller never observes a value older than its own confirmed write.
/// Interested parties can follow the snapshots through [`SettingsStore::watcher`].
pub struct SettingsStore<B> {
    backend: B,

    receiver: watch::Receiver<Arc<SettingsSnapshot>>,

    /// Serializes writes so the snapshot order matches the backend's order
    sender: Mutex<watch::Sender<Arc<SettingsSnapshot>>>,
}

/// An immutable view of all settings at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSnapshot {
    /// Incremented by every write
    pub revision: u64,

    /// All records by their key
    pub records: BTreeMap<String, SettingRecord>,
}

impl SettingsSnapshot {
    /// Maps every key to its value
    pub fn to_map(&self) -> SettingsMap {
        self.records
            .iter()
            .map(|(key, record)| (key.clone(), record.value.clone()))
            .collect()
    }

    /// Maps the keys safe for unauthenticated consumers to their value
    pub fn to_public_map(&self) -> SettingsMap {
        self.records
            .iter()
            .filter(|(key, _)| setting_keys::is_public(key))
            .map(|(key, record)| (key.clone(), record.value.clone()))
            .collect()
    }
}

impl<B: SettingsBackend> SettingsStore<B> {
    /// Reads all settings from `backend` and constructs the store around it
    pub async fn load(backend: B) -> Result<Self, SettingsError> {
        let snapshot = Self::read_snapshot(&backend, 0).await?;
        let (sender, receiver) = watch::channel(Arc::new(snapshot));
        Ok(Self {
            backend,
            receiver,
            sender: Mutex::new(sender),
        })
    }

    /// Discards the cache and reads every setting from the backend again.
    ///
    /// This is only necessary if the backend has been written to by someone else.
    pub async fn reload(&self) -> Result<(), SettingsError> {
        let sender = self.sender.lock().await;
        let revision = sender.borrow().revision + 1;
        let snapshot = Self::read_snapshot(&self.backend, revision).await?;
        sender.send_replace(Arc::new(snapshot));
        Ok(())
    }

    /// The backend the store writes through to
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets the current snapshot
    pub fn snapshot(&self) -> Arc<SettingsSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Maps every key to its value
    pub fn get_all(&self) -> SettingsMap {
        self.receiver.borrow().to_map()
    }

    /// Maps the keys safe for unauthenticated consumers to their value
    pub fn get_public(&self) -> SettingsMap {
        self.receiver.borrow().to_public_map()
    }

    /// Gets the value stored under `key`
    pub fn get(&self, key: &str) -> Result<Value, SettingsError> {
        self.receiver
            .borrow()
            .records
            .get(key)
            .map(|record| record.value.clone())
            .ok_or_else(|| SettingsError::NotFound(key.to_string()))
    }

    /// Gets the value stored under `key` deserialized as `T`
    ///
    /// Falls back to `default` if the key is absent or its value has an unexpected shape.
    pub fn get_or_else<T: DeserializeOwned>(&self, key: &str, default: impl FnOnce() -> T) -> T {
        let snapshot = self.receiver.borrow();
        let Some(record) = snapshot.records.get(key) else {
            return default();
        };
        match T::deserialize(&record.value) {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    settings.key = key,
                    error.display = %error,
                    "Stored setting has an unexpected shape, using default"
                );
                default()
            }
        }
    }

    /// Clones a receiver which is notified about every new snapshot.
    pub fn watcher(&self) -> watch::Receiver<Arc<SettingsSnapshot>> {
        self.receiver.clone()
    }

    /// Writes `value` under `key`
    ///
    /// An existing value is replaced (last write wins).
    /// The cached snapshot is replaced before this method returns.
    pub async fn upsert(
        &self,
        key: &str,
        value: Value,
        updated_by: Option<Uuid>,
    ) -> Result<(), SettingsError> {
        validate_key(key)?;

        let record = SettingRecord {
            key: key.to_string(),
            value,
            updated_by,
            updated_at: OffsetDateTime::now_utc(),
        };

        let sender = self.sender.lock().await;
        self.backend
            .upsert(&record)
            .await
            .map_err(|error| SettingsError::Backend(error.into()))?;

        sender.send_modify(|snapshot| {
            let mut next = SettingsSnapshot::clone(snapshot);
            next.revision += 1;
            next.records.insert(record.key.clone(), record);
            *snapshot = Arc::new(next);
        });
        debug!(settings.key = key, "Updated setting");

        Ok(())
    }

    async fn read_snapshot(backend: &B, revision: u64) -> Result<SettingsSnapshot, SettingsError> {
        let records = backend
            .load_all()
            .await
            .map_err(|error| SettingsError::Backend(error.into()))?;
        Ok(SettingsSnapshot {
            revision,
            records: records
                .into_iter()
                .map(|record| (record.key.clone(), record))
                .collect(),
        })
    }
}

fn validate_key(key: &str) -> Result<(), SettingsError> {
    if key.trim().is_empty() {
        return Err(SettingsError::EmptyKey);
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(SettingsError::KeyTooLong(key.to_string()));
    }
    Ok(())
}

/// Error returned by [`SettingsStore`]
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The key is empty or consists only of whitespace.
    #[error("The settings key must not be empty")]
    EmptyKey,

    /// The key is too long.
    ///
    /// A key must not be more than 255 bytes long.
    #[error("The settings key '{0}' is too long")]
    KeyTooLong(String),

    /// There is no value stored under the key.
    ///
    /// Readers usually fall back to a default instead of reporting this.
    #[error("The settings key '{0}' does not exist")]
    NotFound(String),

    /// The backend failed to read or write.
    ///
    /// Reads may be retried. A write must not be retried without the user's knowledge.
    #[error("The settings backend failed: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl SettingsError {
    /// Is the error caused by invalid input?
    pub fn is_validation(&self) -> bool {
        matches!(self, SettingsError::EmptyKey | SettingsError::KeyTooLong(_))
    }
}

impl From<SettingsError> for ApiError {
    #[track_caller]
    fn from(error: SettingsError) -> Self {
        match error {
            SettingsError::EmptyKey => {
                ApiError::bad_request("The settings key must not be empty").with_source(error)
            }
            SettingsError::KeyTooLong(_) => {
                ApiError::bad_request("The settings key is too long").with_source(error)
            }
            SettingsError::NotFound(_) => {
                ApiError::not_found("Unknown settings key").with_source(error)
            }
            SettingsError::Backend(_) => {
                ApiError::server_error("Settings backend failed").with_source(error)
            }
        }
    }
}
