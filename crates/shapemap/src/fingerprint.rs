//! Deterministic structural fingerprints for domain types and fields.
//!
//! Same shape, same ID: the hashes depend only on the fully-qualified
//! type name and the set of declared field signatures, never on
//! enumeration order, the process, or the machine. SHA-256 truncated
//! to `i64` keeps the IDs stable across restarts.

use crate::descriptor::{FieldDescriptor, TypeDescriptor};
use crate::ids::{EntityFieldId, EntityTypeId};
use crate::record::{EntityFieldRecord, EntityTypeRecord};
use sha2::{Digest, Sha256};

// Domain separators keep a type hash from colliding with a field
// hash over the same bytes.
const TYPE_DOMAIN: &[u8] = b"shapemap/type/v1";
const FIELD_DOMAIN: &[u8] = b"shapemap/field/v1";
const UNIT_SEP: &[u8] = &[0x1f];

/// Fingerprint of a single field: a function of the declaring type,
/// the field name, and the field's static type.
pub fn field_fingerprint(declared_by: &str, name: &str, type_name: &str) -> EntityFieldId {
    let mut hasher = Sha256::new();
    hasher.update(FIELD_DOMAIN);
    hasher.update(UNIT_SEP);
    hasher.update(declared_by.as_bytes());
    hasher.update(UNIT_SEP);
    hasher.update(name.as_bytes());
    hasher.update(UNIT_SEP);
    hasher.update(type_name.as_bytes());
    EntityFieldId::new(truncate_to_i64(hasher.finalize().as_slice()))
}

/// Fingerprint of a whole type: a function of its fully-qualified
/// name and its field signatures. Signatures are sorted first so the
/// introspection order is irrelevant.
pub fn type_fingerprint(type_name: &str, fields: &[FieldDescriptor]) -> EntityTypeId {
    let mut signatures: Vec<String> = fields
        .iter()
        .map(|f| format!("{}\u{1f}{}\u{1f}{}", f.declared_by, f.name, f.type_name))
        .collect();
    signatures.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(TYPE_DOMAIN);
    hasher.update(UNIT_SEP);
    hasher.update(type_name.as_bytes());
    for signature in &signatures {
        hasher.update(UNIT_SEP);
        hasher.update(signature.as_bytes());
    }
    EntityTypeId::new(truncate_to_i64(hasher.finalize().as_slice()))
}

fn truncate_to_i64(digest: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(buf)
}

/// Compute the full mapping record for a type descriptor.
///
/// Returns `None` when there is nothing to map: a descriptor with an
/// empty type name (the universal base type has no shape of its own).
/// A type with zero fields is a valid shape and yields a record with
/// an empty field list.
pub fn compute_type_fingerprint(descriptor: &TypeDescriptor) -> Option<EntityTypeRecord> {
    if descriptor.type_name.is_empty() {
        return None;
    }

    let type_id = type_fingerprint(&descriptor.type_name, &descriptor.fields);
    let fields = descriptor
        .fields
        .iter()
        .map(|f| EntityFieldRecord {
            field_id: field_fingerprint(&f.declared_by, &f.name, &f.type_name),
            field_name: f.name.clone(),
            owner_type_id: type_id,
        })
        .collect();

    Some(EntityTypeRecord {
        type_id,
        type_name: descriptor.type_name.clone(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_descriptor() -> TypeDescriptor {
        TypeDescriptor::new("billing.Order")
            .field("id", "i64")
            .field("total", "f64")
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = compute_type_fingerprint(&order_descriptor()).unwrap();
        let b = compute_type_fingerprint(&order_descriptor()).unwrap();

        assert_eq!(a.type_id, b.type_id);
        for (fa, fb) in a.fields.iter().zip(b.fields.iter()) {
            assert_eq!(fa.field_id, fb.field_id);
        }
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let forward = TypeDescriptor::new("billing.Order")
            .field("id", "i64")
            .field("total", "f64");
        let reversed = TypeDescriptor::new("billing.Order")
            .field("total", "f64")
            .field("id", "i64");

        assert_eq!(
            type_fingerprint(&forward.type_name, &forward.fields),
            type_fingerprint(&reversed.type_name, &reversed.fields),
        );
    }

    #[test]
    fn test_adding_a_field_changes_the_type_id() {
        let base = compute_type_fingerprint(&order_descriptor()).unwrap();
        let grown =
            compute_type_fingerprint(&order_descriptor().field("currency", "String")).unwrap();

        assert_ne!(base.type_id, grown.type_id);
    }

    #[test]
    fn test_renaming_a_field_changes_the_type_id() {
        let base = compute_type_fingerprint(&order_descriptor()).unwrap();
        let renamed = compute_type_fingerprint(
            &TypeDescriptor::new("billing.Order")
                .field("id", "i64")
                .field("amount", "f64"),
        )
        .unwrap();

        assert_ne!(base.type_id, renamed.type_id);
    }

    #[test]
    fn test_renaming_the_type_changes_the_type_id() {
        let base = type_fingerprint("billing.Order", &[]);
        let renamed = type_fingerprint("billing.Invoice", &[]);

        assert_ne!(base, renamed);
    }

    #[test]
    fn test_same_field_name_in_different_types_gets_distinct_ids() {
        let a = field_fingerprint("billing.Order", "id", "i64");
        let b = field_fingerprint("crm.Account", "id", "i64");

        assert_ne!(a, b);
    }

    #[test]
    fn test_field_type_is_part_of_the_field_identity() {
        let a = field_fingerprint("billing.Order", "id", "i64");
        let b = field_fingerprint("billing.Order", "id", "String");

        assert_ne!(a, b);
    }

    #[test]
    fn test_unnamed_descriptor_has_nothing_to_map() {
        assert!(compute_type_fingerprint(&TypeDescriptor::new("")).is_none());
    }

    #[test]
    fn test_zero_field_type_is_a_valid_shape() {
        let record = compute_type_fingerprint(&TypeDescriptor::new("billing.Marker")).unwrap();
        assert_eq!(record.type_name, "billing.Marker");
        assert!(record.fields.is_empty());
    }

    #[test]
    fn test_fields_carry_the_owner_type_id() {
        let record = compute_type_fingerprint(&order_descriptor()).unwrap();
        assert!(record.fields.iter().all(|f| f.owner_type_id == record.type_id));
    }
}
