//! Error taxonomy for the mapping engine.
//!
//! "Not found" never appears here: absent rows surface as `Ok(None)`
//! or an empty snapshot, because "not yet mapped" is an expected
//! outcome, not a failure.

use crate::ids::EntityTypeId;
use thiserror::Error;

/// Errors from mapping repository operations.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A schema DDL statement failed while provisioning `object`.
    /// Fatal to the current run; never retried automatically.
    #[error("Failed to provision {object}: {source}")]
    Provisioning {
        object: String,
        #[source]
        source: sqlx::Error,
    },

    /// Insert of an already-present type fingerprint. The
    /// synchronizer recovers from this during a run; from any other
    /// call path it is a hard error.
    #[error("Type fingerprint {type_id} is already mapped")]
    DuplicateKey { type_id: EntityTypeId },

    /// Field rows written without a committed owner type row - a
    /// broken ordering invariant. Always fatal.
    #[error("Field rows for type fingerprint {type_id} have no owning type row")]
    ReferentialViolation { type_id: EntityTypeId },

    /// Underlying session/transport failure. Propagated as-is; the
    /// transaction boundary is the sole consistency guard, so the
    /// core never retries a partially-applied unit.
    #[error("Database error: {0}")]
    Transport(#[from] sqlx::Error),
}

impl MappingError {
    /// Classify a write failure: unique-key and foreign-key
    /// violations become their dedicated variants, everything else
    /// is transport.
    pub(crate) fn classify_write(error: sqlx::Error, type_id: EntityTypeId) -> Self {
        if let sqlx::Error::Database(db) = &error {
            match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation => {
                    return Self::DuplicateKey { type_id };
                }
                sqlx::error::ErrorKind::ForeignKeyViolation => {
                    return Self::ReferentialViolation { type_id };
                }
                _ => {}
            }
        }
        Self::Transport(error)
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    pub fn is_referential_violation(&self) -> bool {
        matches!(self, Self::ReferentialViolation { .. })
    }
}

/// Errors from a synchronization run, with the failing phase (and
/// for per-type units, the type name) attached. A run either
/// completes with a full report or fails here; there is no silent
/// partial mapping.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Schema provisioning failed: {source}")]
    Provisioning {
        #[source]
        source: MappingError,
    },

    #[error("Failed to load the persisted mapping snapshot: {source}")]
    Snapshot {
        #[source]
        source: MappingError,
    },

    #[error("Synchronization failed for type '{type_name}': {source}")]
    Type {
        type_name: String,
        #[source]
        source: MappingError,
    },
}
