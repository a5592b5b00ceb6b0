use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;
use vitrine_core::re_exports::serde_json::Value;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::schema::ContentGroups;
use vitrine_core::schema::ContentRow;
use vitrine_core::schema::group_by_section;
use vitrine_core::stuff::api_error::ApiError;

use crate::backend::ContentBackend;

/// Maximum length of a section or identifier in bytes
const MAX_NAME_LENGTH: usize = 255;

/// Caches all content blocks in memory and writes through to a [`ContentBackend`].
///
/// Works like the settings store:
/// a successful [`ContentStore::upsert`] replaces the cached snapshot before it returns.
pub struct ContentStore<B> {
    backend: B,

    receiver: watch::Receiver<Arc<ContentSnapshot>>,

    sender: Mutex<watch::Sender<Arc<ContentSnapshot>>>,
}

/// An immutable view of all content blocks at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentSnapshot {
    /// Incremented by every write
    pub revision: u64,

    /// All rows by `(section, identifier)`
    pub rows: BTreeMap<(String, String), ContentRow>,
}

impl<B: ContentBackend> ContentStore<B> {
    /// Reads all content from `backend` and constructs the store around it
    pub async fn load(backend: B) -> Result<Self, ContentError> {
        let snapshot = Self::read_snapshot(&backend, 0).await?;
        let (sender, receiver) = watch::channel(Arc::new(snapshot));
        Ok(Self {
            backend,
            receiver,
            sender: Mutex::new(sender),
        })
    }

    /// Discards the cache and reads every row from the backend again.
    pub async fn reload(&self) -> Result<(), ContentError> {
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
    pub fn snapshot(&self) -> Arc<ContentSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Gets every row ordered by section and identifier
    pub fn get_all(&self) -> Vec<ContentRow> {
        self.receiver.borrow().rows.values().cloned().collect()
    }

    /// Gets every value grouped by section and identifier
    pub fn get_all_grouped(&self) -> ContentGroups {
        group_by_section(self.receiver.borrow().rows.values())
    }

    /// Gets the rows of a single section
    ///
    /// An unknown section is simply empty.
    pub fn get_by_section(&self, section: &str) -> Vec<ContentRow> {
        self.receiver
            .borrow()
            .rows
            .values()
            .filter(|row| row.section == section)
            .cloned()
            .collect()
    }

    /// Gets a single block's value
    pub fn get(&self, section: &str, identifier: &str) -> Result<Value, ContentError> {
        self.receiver
            .borrow()
            .rows
            .get(&(section.to_string(), identifier.to_string()))
            .map(|row| row.content.clone())
            .ok_or_else(|| ContentError::NotFound {
                section: section.to_string(),
                identifier: identifier.to_string(),
            })
    }

    /// Clones a receiver which is notified about every new snapshot.
    pub fn watcher(&self) -> watch::Receiver<Arc<ContentSnapshot>> {
        self.receiver.clone()
    }

    /// Replaces the block at `(section, identifier)` with `content`, creating it if necessary
    ///
    /// Returns the stored row.
    pub async fn upsert(
        &self,
        section: &str,
        identifier: &str,
        content: Value,
    ) -> Result<ContentRow, ContentError> {
        validate_name("section", section)?;
        validate_name("identifier", identifier)?;

        let row = ContentRow {
            section: section.to_string(),
            identifier: identifier.to_string(),
            content,
            updated_at: OffsetDateTime::now_utc(),
        };

        let sender = self.sender.lock().await;
        self.backend
            .upsert(&row)
            .await
            .map_err(|error| ContentError::Backend(error.into()))?;

        sender.send_modify(|snapshot| {
            let mut next = ContentSnapshot::clone(snapshot);
            next.revision += 1;
            next.rows
                .insert((row.section.clone(), row.identifier.clone()), row.clone());
            *snapshot = Arc::new(next);
        });
        debug!(content.section = section, content.identifier = identifier, "Updated content");

        Ok(row)
    }

    async fn read_snapshot(backend: &B, revision: u64) -> Result<ContentSnapshot, ContentError> {
        let rows = backend
            .load_all()
            .await
            .map_err(|error| ContentError::Backend(error.into()))?;
        Ok(ContentSnapshot {
            revision,
            rows: rows
                .into_iter()
                .map(|row| ((row.section.clone(), row.identifier.clone()), row))
                .collect(),
        })
    }
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ContentError> {
    if value.trim().is_empty() {
        return Err(ContentError::Empty(field));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(ContentError::TooLong(field));
    }
    Ok(())
}

/// Error returned by [`ContentStore`]
#[derive(Error, Debug)]
pub enum ContentError {
    /// The section or identifier is empty or consists only of whitespace.
    #[error("The {0} must not be empty")]
    Empty(&'static str),

    /// The section or identifier is longer than 255 bytes.
    #[error("The {0} is too long")]
    TooLong(&'static str),

    /// There is no block at the requested position.
    #[error("There is no content at {section}/{identifier}")]
    NotFound {
        /// The requested section
        section: String,
        /// The requested identifier
        identifier: String,
    },

    /// The backend failed to read or write.
    #[error("The content backend failed: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl ContentError {
    /// Is the error caused by invalid input?
    pub fn is_validation(&self) -> bool {
        matches!(self, ContentError::Empty(_) | ContentError::TooLong(_))
    }
}

impl From<ContentError> for ApiError {
    #[track_caller]
    fn from(error: ContentError) -> Self {
        match error {
            ContentError::Empty("section") => {
                ApiError::bad_request("The section must not be empty").with_source(error)
            }
            ContentError::Empty(_) => {
                ApiError::bad_request("The identifier must not be empty").with_source(error)
            }
            ContentError::TooLong(_) => {
                ApiError::bad_request("Section or identifier is too long").with_source(error)
            }
            ContentError::NotFound { .. } => {
                ApiError::not_found("Unknown content block").with_source(error)
            }
            ContentError::Backend(_) => {
                ApiError::server_error("Content backend failed").with_source(error)
            }
        }
    }
}
