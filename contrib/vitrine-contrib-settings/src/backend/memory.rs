use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use thiserror::Error;

use crate::backend::SettingRecord;
use crate::backend::SettingsBackend;

/// [`SettingsBackend`] keeping its records in memory
///
/// It is intended for tests and demos.
/// [`MemorySettingsBackend::set_unavailable`] simulates a database outage.
#[derive(Debug, Default)]
pub struct MemorySettingsBackend {
    records: Mutex<BTreeMap<String, SettingRecord>>,
    unavailable: AtomicBool,
}

/// Error returned by [`MemorySettingsBackend`] while it is marked as unavailable
#[derive(Error, Debug, Copy, Clone)]
#[error("The in-memory settings backend is unavailable")]
pub struct MemoryBackendError;

impl MemorySettingsBackend {
    /// Constructs an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a backend already containing `records`
    pub fn with_records(records: impl IntoIterator<Item = SettingRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|record| (record.key.clone(), record))
                    .collect(),
            ),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every following operation fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), MemoryBackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MemoryBackendError)
        } else {
            Ok(())
        }
    }
}

impl SettingsBackend for MemorySettingsBackend {
    type Error = MemoryBackendError;

    async fn load_all(&self) -> Result<Vec<SettingRecord>, Self::Error> {
        self.check_available()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }

    async fn upsert(&self, record: &SettingRecord) -> Result<(), Self::Error> {
        self.check_available()?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }
}
