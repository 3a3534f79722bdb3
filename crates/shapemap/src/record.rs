//! Persisted mapping records and the point-in-time snapshot.

use crate::ids::{EntityFieldId, EntityTypeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One domain type's mapping entry: the type fingerprint plus the
/// fingerprints of every declared field.
///
/// Records are built transiently by the fingerprint calculator and
/// become durable only when the repository writes them. The type ID
/// is immutable once persisted; a structural change to the type
/// produces a new record with a new ID rather than mutating the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeRecord {
    pub type_id: EntityTypeId,

    /// Fully-qualified name of the domain type.
    pub type_name: String,

    /// Field records, in the order the descriptor listed them.
    /// Position carries no meaning; identity lives in `field_id`.
    pub fields: Vec<EntityFieldRecord>,
}

/// One field of a mapped domain type.
///
/// `owner_type_id` is a lookup back-reference, not an ownership edge;
/// field rows are owned by their [`EntityTypeRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFieldRecord {
    pub field_id: EntityFieldId,
    pub field_name: String,
    pub owner_type_id: EntityTypeId,
}

/// Point-in-time projection of the type lookup table, keyed by
/// fully-qualified type name.
///
/// Read once per synchronization run; stale as soon as the run
/// applies writes. Never refreshed in place.
#[derive(Debug, Clone, Default)]
pub struct MappingSnapshot {
    by_name: HashMap<String, EntityTypeId>,
}

impl MappingSnapshot {
    pub fn get(&self, type_name: &str) -> Option<EntityTypeId> {
        self.by_name.get(type_name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub(crate) fn insert(&mut self, type_name: String, type_id: EntityTypeId) {
        self.by_name.insert(type_name, type_id);
    }
}
