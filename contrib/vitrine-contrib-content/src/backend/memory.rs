use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use thiserror::Error;
use vitrine_core::schema::ContentRow;

use crate::backend::ContentBackend;

/// [`ContentBackend`] keeping its rows in memory
///
/// [`MemoryContentBackend::set_unavailable`] simulates a database outage.
#[derive(Debug, Default)]
pub struct MemoryContentBackend {
    rows: Mutex<BTreeMap<(String, String), ContentRow>>,
    unavailable: AtomicBool,
}

/// Error returned by [`MemoryContentBackend`] while it is marked as unavailable
#[derive(Error, Debug, Copy, Clone)]
#[error("The in-memory content backend is unavailable")]
pub struct MemoryBackendError;

impl MemoryContentBackend {
    /// Constructs an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a backend already containing `rows`
    pub fn with_rows(rows: impl IntoIterator<Item = ContentRow>) -> Self {
        Self {
            rows: Mutex::new(
                rows.into_iter()
                    .map(|row| ((row.section.clone(), row.identifier.clone()), row))
                    .collect(),
            ),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Makes every following operation fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl ContentBackend for MemoryContentBackend {
    type Error = MemoryBackendError;

    async fn load_all(&self) -> Result<Vec<ContentRow>, Self::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MemoryBackendError);
        }
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.values().cloned().collect())
    }

    async fn upsert(&self, row: &ContentRow) -> Result<(), Self::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MemoryBackendError);
        }
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.insert((row.section.clone(), row.identifier.clone()), row.clone());
        Ok(())
    }
}
