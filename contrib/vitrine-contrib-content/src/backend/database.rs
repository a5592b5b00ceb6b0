use rorm::Database;
use rorm::and;
use rorm::fields::types::Json;
use rorm::fields::types::MaxStr;
use thiserror::Error;
use vitrine_core::re_exports::uuid::Uuid;
use vitrine_core::schema::ContentRow;

use crate::backend::ContentBackend;
use crate::model::VitrineContent;

/// [`ContentBackend`] storing content blocks in the [`VitrineContent`] table
#[derive(Clone)]
pub struct RormContentBackend {
    db: Database,
}

impl RormContentBackend {
    /// Constructs a new backend using the database connection pool `db`
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Error returned by [`RormContentBackend`]
#[derive(Error, Debug)]
pub enum RormBackendError {
    /// The database reported an error
    #[error(transparent)]
    Database(#[from] rorm::Error),

    /// The section or identifier does not fit into its column
    #[error("'{0}' is too long")]
    TooLong(String),
}

fn max_str(value: &str) -> Result<MaxStr<255>, RormBackendError> {
    MaxStr::new(value.to_string()).map_err(|_| RormBackendError::TooLong(value.to_string()))
}

impl ContentBackend for RormContentBackend {
    type Error = RormBackendError;

    async fn load_all(&self) -> Result<Vec<ContentRow>, Self::Error> {
        let rows = rorm::query(&self.db, VitrineContent).all().await?;
        Ok(rows
            .into_iter()
            .map(|row| ContentRow {
                section: row.section.to_string(),
                identifier: row.identifier.to_string(),
                content: row.content.0,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn upsert(&self, row: &ContentRow) -> Result<(), Self::Error> {
        let section = max_str(&row.section)?;
        let identifier = max_str(&row.identifier)?;

        let mut tx = self.db.start_transaction().await?;

        let existing = rorm::query(&mut tx, VitrineContent.uuid)
            .condition(and![
                VitrineContent.section.equals(&*section),
                VitrineContent.identifier.equals(&*identifier)
            ])
            .optional()
            .await?;

        if let Some(uuid) = existing {
            rorm::update(&mut tx, VitrineContent)
                .set(VitrineContent.content, Json(row.content.clone()))
                .set(VitrineContent.updated_at, row.updated_at)
                .condition(VitrineContent.uuid.equals(uuid))
                .await?;
        } else {
            rorm::insert(&mut tx, VitrineContent)
                .return_nothing()
                .single(&VitrineContent {
                    uuid: Uuid::new_v4(),
                    section,
                    identifier,
                    content: Json(row.content.clone()),
                    updated_at: row.updated_at,
                })
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
