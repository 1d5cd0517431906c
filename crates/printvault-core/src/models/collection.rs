use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub Uuid);

impl CollectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered grouping of library files. The thumbnail reference is cleared,
/// not cascaded, when the referenced file is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub description: Option<String>,
    /// Checksum of the member whose thumbnail represents this collection.
    pub thumbnail_checksum: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CollectionId::new(),
            name,
            description,
            thumbnail_checksum: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Membership of a checksum in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMember {
    pub collection_id: CollectionId,
    pub checksum: String,
    pub sort_order: i64,
    pub added_at: DateTime<Utc>,
}
