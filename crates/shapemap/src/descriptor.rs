//! Type and field descriptors - the introspection boundary.
//!
//! Rust has no runtime reflection, so domain types declare their
//! shape explicitly: implement [`DescribeType`] (usually through the
//! [`describe_type!`](crate::describe_type) macro) and collect the
//! descriptors in a [`DescriptorRegistry`], which acts as the
//! candidate supplier for a synchronization run.

use serde::{Deserialize, Serialize};

/// A single declared field of a domain type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name as declared.
    pub name: String,

    /// Fully-qualified name of the declaring type.
    pub declared_by: String,

    /// Static type of the field (e.g. "i64", "String").
    pub type_name: String,
}

/// The structural shape of a domain type: its fully-qualified name
/// plus every declared field, public or not.
///
/// Field order carries no meaning; identity lives in the
/// fingerprints derived from the field signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub type_name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    /// Create a descriptor with no fields.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field declared by this type.
    pub fn field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let declared_by = self.type_name.clone();
        self.fields.push(FieldDescriptor {
            name: name.into(),
            declared_by,
            type_name: type_name.into(),
        });
        self
    }
}

/// Capability trait: a type that can describe its own shape.
pub trait DescribeType {
    fn descriptor() -> TypeDescriptor;
}

/// Generate a [`DescribeType`] impl from a struct-shaped field list.
///
/// ```rust,ignore
/// struct Order {
///     id: i64,
///     total: f64,
/// }
///
/// describe_type!(Order, "billing.Order", { id: i64, total: f64 });
/// ```
#[macro_export]
macro_rules! describe_type {
    ($ty:ty, $full_name:expr, { $($field:ident : $field_ty:ty),* $(,)? }) => {
        impl $crate::descriptor::DescribeType for $ty {
            fn descriptor() -> $crate::descriptor::TypeDescriptor {
                $crate::descriptor::TypeDescriptor::new($full_name)
                    $(.field(stringify!($field), stringify!($field_ty)))*
            }
        }
    };
}

/// Ordered collection of descriptors eligible for mapping.
#[derive(Debug, Default, Clone)]
pub struct DescriptorRegistry {
    descriptors: Vec<TypeDescriptor>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a describable type.
    pub fn register<T: DescribeType>(&mut self) {
        self.descriptors.push(T::descriptor());
    }

    /// Register a pre-built descriptor.
    pub fn register_descriptor(&mut self, descriptor: TypeDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[TypeDescriptor] {
        &self.descriptors
    }
}

impl IntoIterator for DescriptorRegistry {
    type Item = TypeDescriptor;
    type IntoIter = std::vec::IntoIter<TypeDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.descriptors.into_iter()
    }
}
