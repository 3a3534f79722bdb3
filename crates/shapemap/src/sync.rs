//! Schema synchronization: reconcile computed fingerprints with the
//! persisted mapping.
//!
//! A run loads the persisted snapshot once, fingerprints every
//! candidate type, diffs by type name, and applies the minimum
//! necessary writes - one transaction per mapping unit (a type row
//! plus all of its field rows). Concurrent runs against the same
//! store are tolerated: the unique constraint on the type fingerprint
//! is the ultimate arbiter, and a lost race is a benign skip, not a
//! failure.

use crate::descriptor::TypeDescriptor;
use crate::error::{MappingError, SyncError};
use crate::fingerprint::compute_type_fingerprint;
use crate::ids::EntityTypeId;
use crate::record::EntityTypeRecord;
use crate::repository::MappingRepository;
use serde::{Deserialize, Serialize};
use shapemap_db::ShapemapDb;
use sqlx::sqlite::SqliteConnection;
use sqlx::Connection;
use tracing::{debug, info};

/// Progress of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Uninitialized,
    SnapshotLoaded,
    NoChangeDetected,
    ChangesApplied,
    Done,
    Failed,
}

/// Per-run tally of what happened to each candidate type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Types mapped for the first time.
    pub inserted: usize,

    /// Types whose shape drifted; the superseded rows were replaced.
    pub remapped: usize,

    /// Types already mapped with an identical fingerprint.
    pub unchanged: usize,

    /// Candidates with nothing to map.
    pub skipped: usize,
}

impl SyncReport {
    /// Number of mapping units written this run.
    pub fn writes(&self) -> usize {
        self.inserted + self.remapped
    }

    pub fn total(&self) -> usize {
        self.inserted + self.remapped + self.unchanged + self.skipped
    }
}

/// Orchestrates synchronization runs against one database.
pub struct SchemaSynchronizer {
    db: ShapemapDb,
    repo: MappingRepository,
}

impl SchemaSynchronizer {
    pub fn new(db: ShapemapDb) -> Self {
        Self {
            db,
            repo: MappingRepository::new(),
        }
    }

    pub fn with_repository(db: ShapemapDb, repo: MappingRepository) -> Self {
        Self { db, repo }
    }

    /// Run one synchronization pass over `candidates`.
    ///
    /// Returns the full tally, or the first failure with the type
    /// name attached - never a silent partial mapping.
    pub async fn synchronize(
        &self,
        candidates: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Result<SyncReport, SyncError> {
        let mut state = SyncState::Uninitialized;

        let mut conn = self.db.pool().acquire().await.map_err(|e| {
            SyncError::Snapshot {
                source: MappingError::Transport(e),
            }
        })?;

        let snapshot = self
            .repo
            .load_snapshot(&mut conn)
            .await
            .map_err(|source| SyncError::Snapshot { source })?;

        if snapshot.is_empty() {
            // Fresh store or empty table: make sure every supporting
            // object exists before the first data transaction.
            self.repo
                .provision_schema(&mut conn)
                .await
                .map_err(|source| SyncError::Provisioning { source })?;
        }

        advance(&mut state, SyncState::SnapshotLoaded);

        let mut report = SyncReport::default();

        for descriptor in candidates {
            let Some(record) = compute_type_fingerprint(&descriptor) else {
                debug!(type_name = %descriptor.type_name, "Nothing to map, skipping");
                report.skipped += 1;
                continue;
            };

            let existing = snapshot.get(&record.type_name);
            if existing == Some(record.type_id) {
                debug!(type_name = %record.type_name, "Fingerprint unchanged");
                report.unchanged += 1;
                continue;
            }

            let supersedes = existing;
            if let Some(old_id) = supersedes {
                info!(
                    type_name = %record.type_name,
                    old = %old_id,
                    new = %record.type_id,
                    "Structural drift detected, remapping"
                );
            }

            match self.apply_unit(&mut conn, &record, supersedes).await {
                Ok(true) if supersedes.is_some() => report.remapped += 1,
                Ok(true) => report.inserted += 1,
                Ok(false) => report.unchanged += 1,
                Err(source) => {
                    advance(&mut state, SyncState::Failed);
                    return Err(SyncError::Type {
                        type_name: record.type_name,
                        source,
                    });
                }
            }
        }

        let outcome = if report.writes() > 0 {
            SyncState::ChangesApplied
        } else {
            SyncState::NoChangeDetected
        };
        advance(&mut state, outcome);
        advance(&mut state, SyncState::Done);

        info!(
            inserted = report.inserted,
            remapped = report.remapped,
            unchanged = report.unchanged,
            skipped = report.skipped,
            "Synchronization complete"
        );
        Ok(report)
    }

    /// Write one mapping unit as a single transaction: optionally
    /// remove a superseded mapping, then the type row, then its field
    /// rows. All-or-nothing - a type row with no field rows (or the
    /// reverse) must never become observable.
    ///
    /// Returns `false` when a concurrent run already mapped this
    /// fingerprint and there was nothing left to do.
    async fn apply_unit(
        &self,
        conn: &mut SqliteConnection,
        record: &EntityTypeRecord,
        supersedes: Option<EntityTypeId>,
    ) -> Result<bool, MappingError> {
        let mut tx = conn.begin().await?;

        // The snapshot may be stale: another run can commit this
        // fingerprint between snapshot load and here. Re-check under
        // the transaction and treat "already there" as done.
        if self.repo.type_id_exists(&mut tx, record.type_id).await? {
            tx.rollback().await?;
            debug!(type_name = %record.type_name, "Already mapped by a concurrent run");
            return Ok(false);
        }

        if let Some(old_id) = supersedes {
            if let Err(e) = self.repo.delete_type_and_fields(&mut tx, old_id).await {
                tx.rollback().await?;
                return Err(e);
            }
        }

        if let Err(e) = self.repo.insert_type_record(&mut tx, record).await {
            tx.rollback().await?;
            if e.is_duplicate_key() {
                // Lost the race between the re-check and the insert;
                // the winner committed the same fingerprint.
                debug!(type_name = %record.type_name, "Concurrent insert won, skipping");
                return Ok(false);
            }
            return Err(e);
        }

        if let Err(e) = self.repo.bulk_insert_fields(&mut tx, record).await {
            tx.rollback().await?;
            return Err(e);
        }

        tx.commit().await?;
        info!(
            type_name = %record.type_name,
            type_id = %record.type_id,
            fields = record.fields.len(),
            "Mapping unit committed"
        );
        Ok(true)
    }
}

fn advance(state: &mut SyncState, next: SyncState) {
    debug!(from = ?state, to = ?next, "Sync state transition");
    *state = next;
}
