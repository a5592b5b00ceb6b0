use std::error::Error;

use vitrine_core::re_exports::serde_json::Value;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::re_exports::uuid::Uuid;

pub use self::database::RormBackendError;
pub use self::database::RormSettingsBackend;
pub use self::memory::MemoryBackendError;
pub use self::memory::MemorySettingsBackend;

mod database;
mod memory;

/// A setting as it is persisted by a [`SettingsBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct SettingRecord {
    /// Unique, non-empty key of at most 255 bytes
    pub key: String,

    /// The setting's value
    pub value: Value,

    /// The account which wrote the current value
    pub updated_by: Option<Uuid>,

    /// Point in time of the last write
    pub updated_at: OffsetDateTime,
}

/// Persistent storage of [`SettingRecord`]s
///
/// The [`SettingsStore`](crate::SettingsStore) validates keys before they reach the backend.
/// A backend only has to guarantee at most one record per key.
pub trait SettingsBackend: Send + Sync + 'static {
    /// Error produced by the underlying storage
    type Error: Error + Send + Sync + 'static;

    /// Reads every stored record
    fn load_all(&self) -> impl Future<Output = Result<Vec<SettingRecord>, Self::Error>> + Send;

    /// Inserts the record or replaces the one with the same key
    fn upsert(
        &self,
        record: &SettingRecord,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
