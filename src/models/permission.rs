use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted permission row, keyed by `(entity_type_id, codename)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub entity_type_id: Uuid,
    /// App label of the row's entity type.
    pub namespace: String,
    pub codename: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    /// The `namespace.codename` string users are checked against.
    pub fn identifier(&self) -> String {
        format!("{}.{}", self.namespace, self.codename)
    }
}
