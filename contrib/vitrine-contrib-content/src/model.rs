use rorm::Model;
use rorm::fields::types::Json;
use rorm::fields::types::MaxStr;
use vitrine_core::re_exports::serde_json::Value;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::re_exports::uuid::Uuid;

/// A single content block
///
/// `(section, identifier)` is unique.
/// The database can't express this, so [`RormContentBackend`](crate::RormContentBackend)
/// checks it inside a transaction.
#[derive(Model)]
pub struct VitrineContent {
    /// Primary key
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The page section the block belongs to
    pub section: MaxStr<255>,

    /// The block's name inside its section
    pub identifier: MaxStr<255>,

    /// Arbitrary json value
    pub content: Json<Value>,

    /// Point in time of the last write
    pub updated_at: OffsetDateTime,
}
