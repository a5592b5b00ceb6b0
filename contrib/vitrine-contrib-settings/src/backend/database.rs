use rorm::Database;
use rorm::fields::types::Json;
use rorm::fields::types::MaxStr;
use thiserror::Error;
use vitrine_core::re_exports::uuid::Uuid;

use crate::backend::SettingRecord;
use crate::backend::SettingsBackend;
use crate::model::VitrineSetting;

/// [`SettingsBackend`] storing settings in the [`VitrineSetting`] table
#[derive(Clone)]
pub struct RormSettingsBackend {
    db: Database,
}

impl RormSettingsBackend {
    /// Constructs a new backend using the database connection pool `db`
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Error returned by [`RormSettingsBackend`]
#[derive(Error, Debug)]
pub enum RormBackendError {
    /// The database reported an error
    #[error(transparent)]
    Database(#[from] rorm::Error),

    /// The key does not fit into its column
    #[error("The settings key '{0}' is too long")]
    KeyTooLong(String),
}

impl SettingsBackend for RormSettingsBackend {
    type Error = RormBackendError;

    async fn load_all(&self) -> Result<Vec<SettingRecord>, Self::Error> {
        let rows = rorm::query(&self.db, VitrineSetting).all().await?;
        Ok(rows
            .into_iter()
            .map(|row| SettingRecord {
                key: row.key.to_string(),
                value: row.value.0,
                updated_by: row.updated_by,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn upsert(&self, record: &SettingRecord) -> Result<(), Self::Error> {
        // The store rejects longer keys before they reach us
        let key = MaxStr::<255>::new(record.key.clone())
            .map_err(|_| RormBackendError::KeyTooLong(record.key.clone()))?;

        let mut tx = self.db.start_transaction().await?;

        let existing = rorm::query(&mut tx, VitrineSetting.uuid)
            .condition(VitrineSetting.key.equals(&*key))
            .optional()
            .await?;

        if let Some(uuid) = existing {
            rorm::update(&mut tx, VitrineSetting)
                .set(VitrineSetting.value, Json(record.value.clone()))
                .set(VitrineSetting.updated_by, record.updated_by)
                .set(VitrineSetting.updated_at, record.updated_at)
                .condition(VitrineSetting.uuid.equals(uuid))
                .await?;
        } else {
            rorm::insert(&mut tx, VitrineSetting)
                .return_nothing()
                .single(&VitrineSetting {
                    uuid: Uuid::new_v4(),
                    key,
                    value: Json(record.value.clone()),
                    updated_by: record.updated_by,
                    updated_at: record.updated_at,
                })
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
