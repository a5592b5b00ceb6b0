use std::error::Error;

use vitrine_core::schema::ContentRow;

pub use self::database::RormBackendError;
pub use self::database::RormContentBackend;
pub use self::memory::MemoryBackendError;
pub use self::memory::MemoryContentBackend;

mod database;
mod memory;

/// Persistent storage of [`ContentRow`]s
///
/// A backend has to guarantee at most one row per `(section, identifier)`.
pub trait ContentBackend: Send + Sync + 'static {
    /// Error produced by the underlying storage
    type Error: Error + Send + Sync + 'static;

    /// Reads every stored row
    fn load_all(&self) -> impl Future<Output = Result<Vec<ContentRow>, Self::Error>> + Send;

    /// Inserts the row or replaces the one with the same `(section, identifier)`
    fn upsert(&self, row: &ContentRow) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
