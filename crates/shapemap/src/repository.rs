//! Persistence for the entity mapping tables.
//!
//! Every operation runs against an injected session
//! (`&mut SqliteConnection`); transaction boundaries belong to the
//! caller. Table and index names are compile-time constants owned by
//! [`MappingTables`]; row values are always bound parameters.

use crate::error::MappingError;
use crate::ids::{EntityFieldId, EntityTypeId};
use crate::record::{EntityTypeRecord, MappingSnapshot};
use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use tracing::{debug, info};

/// Names of the persisted lookup objects.
///
/// Immutable; owned by the repository at construction. The defaults
/// are the canonical names consumers query against.
#[derive(Debug, Clone)]
pub struct MappingTables {
    pub type_table: &'static str,
    pub field_table: &'static str,
    pub field_index: &'static str,
}

impl Default for MappingTables {
    fn default() -> Self {
        Self {
            type_table: "EntityTypeLookup",
            field_table: "EntityPropertyLookup",
            field_index: "IDX_EntityPropertyLookup_EntityTypeID",
        }
    }
}

/// Row-level access to the two lookup tables.
#[derive(Debug, Clone, Default)]
pub struct MappingRepository {
    tables: MappingTables,
}

impl MappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: MappingTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &MappingTables {
        &self.tables
    }

    /// Idempotently ensure both lookup tables and the FK index exist.
    ///
    /// Safe to call on every startup: each statement checks existence
    /// before creating. A failed statement surfaces as
    /// [`MappingError::Provisioning`] naming the object; nothing is
    /// retried here - the caller re-invokes after fixing the store.
    pub async fn provision_schema(&self, conn: &mut SqliteConnection) -> Result<(), MappingError> {
        let type_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                EntityTypeID INTEGER NOT NULL UNIQUE,
                EntityTypeName TEXT,
                CreatedAt INTEGER NOT NULL
            )",
            self.tables.type_table
        );

        let field_table = format!(
            "CREATE TABLE IF NOT EXISTS {field} (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                EntityPropertyID INTEGER NOT NULL,
                EntityPropertyName TEXT,
                EntityTypeID INTEGER NOT NULL REFERENCES {ty}(EntityTypeID)
            )",
            field = self.tables.field_table,
            ty = self.tables.type_table,
        );

        let field_index = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}(EntityTypeID)",
            self.tables.field_index, self.tables.field_table,
        );

        // Dependency order: the field table references the type table.
        let objects = [
            (self.tables.type_table, type_table),
            (self.tables.field_table, field_table),
            (self.tables.field_index, field_index),
        ];

        for (object, ddl) in objects {
            sqlx::query(&ddl)
                .execute(&mut *conn)
                .await
                .map_err(|source| MappingError::Provisioning {
                    object: object.to_string(),
                    source,
                })?;
        }

        info!("Mapping schema provisioned");
        Ok(())
    }

    /// Load all `(EntityTypeName, EntityTypeID)` pairs into a
    /// name-keyed snapshot.
    ///
    /// A missing table or an empty one yields an empty snapshot; that
    /// is the "no mapping exists yet" signal, not an error.
    pub async fn load_snapshot(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<MappingSnapshot, MappingError> {
        if !self.table_exists(conn, self.tables.type_table).await? {
            return Ok(MappingSnapshot::default());
        }

        let sql = format!(
            "SELECT EntityTypeName, EntityTypeID FROM {}",
            self.tables.type_table
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

        let mut snapshot = MappingSnapshot::default();
        for row in rows {
            let name: String = row.get("EntityTypeName");
            let id: i64 = row.get("EntityTypeID");
            snapshot.insert(name, EntityTypeId::new(id));
        }

        debug!(types = snapshot.len(), "Mapping snapshot loaded");
        Ok(snapshot)
    }

    /// Insert a single type row.
    ///
    /// Not idempotent: an existing `EntityTypeID` is a
    /// [`MappingError::DuplicateKey`]; callers check the snapshot (and
    /// re-check under their transaction) before inserting.
    pub async fn insert_type_record(
        &self,
        conn: &mut SqliteConnection,
        record: &EntityTypeRecord,
    ) -> Result<u64, MappingError> {
        let sql = format!(
            "INSERT INTO {} (EntityTypeID, EntityTypeName, CreatedAt) VALUES (?, ?, ?)",
            self.tables.type_table
        );

        let result = sqlx::query(&sql)
            .bind(record.type_id.get())
            .bind(record.type_name.as_str())
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *conn)
            .await
            .map_err(|e| MappingError::classify_write(e, record.type_id))?;

        debug!(type_name = %record.type_name, type_id = %record.type_id, "Type row inserted");
        Ok(result.rows_affected())
    }

    /// Insert every field row of `record` as one multi-row statement
    /// (a single round trip).
    ///
    /// The owning type row must already exist in the session's view;
    /// otherwise the referential constraint rejects the batch as
    /// [`MappingError::ReferentialViolation`]. A record with no
    /// fields inserts nothing and returns 0.
    pub async fn bulk_insert_fields(
        &self,
        conn: &mut SqliteConnection,
        record: &EntityTypeRecord,
    ) -> Result<u64, MappingError> {
        if record.fields.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} (EntityPropertyID, EntityPropertyName, EntityTypeID) ",
            self.tables.field_table
        ));
        builder.push_values(record.fields.iter(), |mut row, field| {
            row.push_bind(field.field_id.get())
                .push_bind(field.field_name.as_str())
                .push_bind(record.type_id.get());
        });

        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| MappingError::classify_write(e, record.type_id))?;

        debug!(
            type_id = %record.type_id,
            fields = result.rows_affected(),
            "Field rows inserted"
        );
        Ok(result.rows_affected())
    }

    /// Remove a mapped type and all of its field rows.
    ///
    /// Field rows go first to satisfy the referential constraint; the
    /// caller owns the surrounding transaction. Returns whether any
    /// row was deleted - deleting an unmapped fingerprint is a no-op,
    /// not an error.
    pub async fn delete_type_and_fields(
        &self,
        conn: &mut SqliteConnection,
        type_id: EntityTypeId,
    ) -> Result<bool, MappingError> {
        let fields_sql = format!(
            "DELETE FROM {} WHERE EntityTypeID = ?",
            self.tables.field_table
        );
        let field_rows = sqlx::query(&fields_sql)
            .bind(type_id.get())
            .execute(&mut *conn)
            .await?
            .rows_affected();

        let type_sql = format!(
            "DELETE FROM {} WHERE EntityTypeID = ?",
            self.tables.type_table
        );
        let type_rows = sqlx::query(&type_sql)
            .bind(type_id.get())
            .execute(&mut *conn)
            .await?
            .rows_affected();

        debug!(type_id = %type_id, field_rows, type_rows, "Mapping removed");
        Ok(field_rows + type_rows > 0)
    }

    /// Point lookup of a type's fingerprint by fully-qualified name.
    pub async fn lookup_type_id(
        &self,
        conn: &mut SqliteConnection,
        type_name: &str,
    ) -> Result<Option<EntityTypeId>, MappingError> {
        let sql = format!(
            "SELECT EntityTypeID FROM {} WHERE EntityTypeName = ?",
            self.tables.type_table
        );
        let row = sqlx::query(&sql)
            .bind(type_name)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(|r| EntityTypeId::new(r.get::<i64, _>("EntityTypeID"))))
    }

    /// Point lookup of a field's name by its fingerprint.
    pub async fn lookup_field_name(
        &self,
        conn: &mut SqliteConnection,
        field_id: EntityFieldId,
    ) -> Result<Option<String>, MappingError> {
        let sql = format!(
            "SELECT EntityPropertyName FROM {} WHERE EntityPropertyID = ?",
            self.tables.field_table
        );
        let row = sqlx::query(&sql)
            .bind(field_id.get())
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(|r| r.get("EntityPropertyName")))
    }

    /// Bulk projection of every persisted field fingerprint to its
    /// name. Empty when the table has not been provisioned yet.
    pub async fn load_field_names(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<HashMap<EntityFieldId, String>, MappingError> {
        if !self.table_exists(conn, self.tables.field_table).await? {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT EntityPropertyID, EntityPropertyName FROM {}",
            self.tables.field_table
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    EntityFieldId::new(r.get::<i64, _>("EntityPropertyID")),
                    r.get::<String, _>("EntityPropertyName"),
                )
            })
            .collect())
    }

    /// Existence probe by fingerprint. The synchronizer re-checks
    /// this inside each write transaction to tolerate concurrent
    /// writers.
    pub async fn type_id_exists(
        &self,
        conn: &mut SqliteConnection,
        type_id: EntityTypeId,
    ) -> Result<bool, MappingError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE EntityTypeID = ?",
            self.tables.type_table
        );
        let row = sqlx::query(&sql)
            .bind(type_id.get())
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.is_some())
    }

    async fn table_exists(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
    ) -> Result<bool, MappingError> {
        let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;
    use crate::fingerprint::compute_type_fingerprint;
    use shapemap_db::ShapemapDb;
    use sqlx::Connection;

    fn order_record() -> EntityTypeRecord {
        compute_type_fingerprint(
            &TypeDescriptor::new("billing.Order")
                .field("id", "i64")
                .field("total", "f64"),
        )
        .unwrap()
    }

    async fn provisioned_db() -> ShapemapDb {
        let db = ShapemapDb::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        MappingRepository::new()
            .provision_schema(&mut conn)
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let repo = MappingRepository::new();
        let db = ShapemapDb::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        repo.provision_schema(&mut conn).await.unwrap();
        repo.provision_schema(&mut conn).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('EntityTypeLookup', 'EntityPropertyLookup') ORDER BY name",
        )
        .fetch_all(&mut *conn)
        .await
        .unwrap();
        assert_eq!(tables, vec!["EntityPropertyLookup", "EntityTypeLookup"]);
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_table_is_empty() {
        let repo = MappingRepository::new();
        let db = ShapemapDb::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let snapshot = repo.load_snapshot(&mut conn).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_snapshot_roundtrip() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let record = order_record();

        let rows = repo.insert_type_record(&mut conn, &record).await.unwrap();
        assert_eq!(rows, 1);
        let rows = repo.bulk_insert_fields(&mut conn, &record).await.unwrap();
        assert_eq!(rows, 2);

        let snapshot = repo.load_snapshot(&mut conn).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("billing.Order"), Some(record.type_id));
    }

    #[tokio::test]
    async fn test_duplicate_type_insert_is_a_duplicate_key() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let record = order_record();

        repo.insert_type_record(&mut conn, &record).await.unwrap();
        let err = repo
            .insert_type_record(&mut conn, &record)
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[tokio::test]
    async fn test_fields_without_owner_row_violate_the_constraint() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let record = order_record();

        let err = repo
            .bulk_insert_fields(&mut conn, &record)
            .await
            .unwrap_err();
        assert!(err.is_referential_violation());
    }

    #[tokio::test]
    async fn test_failed_unit_rolls_back_the_type_row() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let order = order_record();
        let unrelated = compute_type_fingerprint(
            &TypeDescriptor::new("crm.Account").field("id", "i64"),
        )
        .unwrap();

        let mut tx = conn.begin().await.unwrap();
        repo.insert_type_record(&mut tx, &order).await.unwrap();
        // Field rows for a type whose row was never written: the unit
        // must fail and take the order row down with it.
        let err = repo
            .bulk_insert_fields(&mut tx, &unrelated)
            .await
            .unwrap_err();
        assert!(err.is_referential_violation());
        tx.rollback().await.unwrap();

        let snapshot = repo.load_snapshot(&mut conn).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_both_tables_and_reports_absence() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let record = order_record();

        repo.insert_type_record(&mut conn, &record).await.unwrap();
        repo.bulk_insert_fields(&mut conn, &record).await.unwrap();

        let mut tx = conn.begin().await.unwrap();
        let deleted = repo
            .delete_type_and_fields(&mut tx, record.type_id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(deleted);

        let field_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM EntityPropertyLookup")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(field_count, 0);
        assert!(repo.load_snapshot(&mut conn).await.unwrap().is_empty());

        // Second delete: nothing left, reported without raising.
        let mut tx = conn.begin().await.unwrap();
        let deleted = repo
            .delete_type_and_fields(&mut tx, record.type_id)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(!deleted);
    }

    #[tokio::test]
    async fn test_point_lookups() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let record = order_record();

        repo.insert_type_record(&mut conn, &record).await.unwrap();
        repo.bulk_insert_fields(&mut conn, &record).await.unwrap();

        let found = repo
            .lookup_type_id(&mut conn, "billing.Order")
            .await
            .unwrap();
        assert_eq!(found, Some(record.type_id));
        let missing = repo
            .lookup_type_id(&mut conn, "billing.Invoice")
            .await
            .unwrap();
        assert_eq!(missing, None);

        let field = &record.fields[0];
        let name = repo
            .lookup_field_name(&mut conn, field.field_id)
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some(field.field_name.as_str()));
        assert!(repo
            .type_id_exists(&mut conn, record.type_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_load_field_names_projects_every_row() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let record = order_record();

        repo.insert_type_record(&mut conn, &record).await.unwrap();
        repo.bulk_insert_fields(&mut conn, &record).await.unwrap();

        let names = repo.load_field_names(&mut conn).await.unwrap();
        assert_eq!(names.len(), 2);
        for field in &record.fields {
            assert_eq!(names.get(&field.field_id), Some(&field.field_name));
        }
    }

    #[tokio::test]
    async fn test_zero_field_record_inserts_no_field_rows() {
        let repo = MappingRepository::new();
        let db = provisioned_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let record = compute_type_fingerprint(&TypeDescriptor::new("billing.Marker")).unwrap();

        repo.insert_type_record(&mut conn, &record).await.unwrap();
        let rows = repo.bulk_insert_fields(&mut conn, &record).await.unwrap();
        assert_eq!(rows, 0);
    }
}
