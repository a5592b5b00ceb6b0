use rorm::Model;
use rorm::fields::types::Json;
use rorm::fields::types::MaxStr;
use vitrine_core::re_exports::serde_json::Value;
use vitrine_core::re_exports::time::OffsetDateTime;
use vitrine_core::re_exports::uuid::Uuid;

/// A single branding setting
#[derive(Model)]
pub struct VitrineSetting {
    /// Primary key
    #[rorm(primary_key)]
    pub uuid: Uuid,

    /// The setting's name, e.g. `companyName`
    #[rorm(unique)]
    pub key: MaxStr<255>,

    /// Arbitrary json value
    pub value: Json<Value>,

    /// The account which wrote the current value
    pub updated_by: Option<Uuid>,

    /// Point in time of the last write
    pub updated_at: OffsetDateTime,
}
