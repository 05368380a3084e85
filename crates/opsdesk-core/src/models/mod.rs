pub mod audit;
pub mod notification;

pub use audit::{AuditEntry, SecurityNotice};
pub use notification::NotificationRecord;

use serde::{Deserialize, Deserializer};

/// Record ids arrive as strings or numbers depending on the backend; keep
/// them as strings so lookups and mark-read paths stay uniform.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Unsigned(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Int(id) => id.to_string(),
        RawId::Unsigned(id) => id.to_string(),
    })
}
