//! Shapemap - fingerprinting and schema synchronization for domain
//! types.
//!
//! A domain type's shape (fully-qualified name plus declared fields)
//! reduces to a stable numeric fingerprint. Two SQLite lookup tables
//! pair those fingerprints with names, and a synchronization run
//! reconciles the tables with the shapes the application currently
//! declares:
//!
//! 1. **Describe**: types register their shape ([`descriptor`]).
//! 2. **Fingerprint**: shapes become stable IDs ([`fingerprint`]).
//! 3. **Diff**: computed IDs are compared with the persisted
//!    snapshot ([`record`]).
//! 4. **Apply**: new and drifted mappings are written, one
//!    transaction per mapping unit ([`sync`]).
//!
//! Structural drift (a changed field set or a renamed type) produces
//! a new fingerprint; the superseded mapping is deleted and the
//! replacement inserted in the same transaction. A run either
//! completes with a full [`sync::SyncReport`] or fails naming the
//! type - never a silent partial mapping.
//!
//! ```rust,ignore
//! use shapemap::{DescriptorRegistry, SchemaSynchronizer};
//! use shapemap_db::ShapemapDb;
//!
//! let db = ShapemapDb::open("mappings.db").await?;
//! let mut registry = DescriptorRegistry::new();
//! registry.register::<Order>();
//!
//! let report = SchemaSynchronizer::new(db).synchronize(registry).await?;
//! println!("inserted {}, remapped {}", report.inserted, report.remapped);
//! ```

pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod ids;
pub mod record;
pub mod repository;
pub mod sync;

pub use descriptor::{DescribeType, DescriptorRegistry, FieldDescriptor, TypeDescriptor};
pub use error::{MappingError, SyncError};
pub use fingerprint::{compute_type_fingerprint, field_fingerprint, type_fingerprint};
pub use ids::{EntityFieldId, EntityTypeId};
pub use record::{EntityFieldRecord, EntityTypeRecord, MappingSnapshot};
pub use repository::{MappingRepository, MappingTables};
pub use sync::{SchemaSynchronizer, SyncReport, SyncState};
