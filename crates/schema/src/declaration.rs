//! Schema declarations
//!
//! Anything that names a type: a static definition, a registry record, or a
//! bare type reference. Migrations and registry lookups accept any of them.

use std::sync::Arc;
use tidepool_core::{Dxn, Error, ObjectId, Result};
use tidepool_query::Filter;

use crate::definition::TypeDefinition;
use crate::record::TypeRecord;

/// A value that resolves to a type reference
pub trait SchemaDeclaration {
    /// Type reference objects of this type carry, if resolvable
    fn type_reference(&self) -> Option<Dxn>;

    /// Backing stored schema, if any
    fn declared_backing_object_id(&self) -> Option<ObjectId> {
        None
    }
}

impl SchemaDeclaration for TypeDefinition {
    fn type_reference(&self) -> Option<Dxn> {
        if self.typename().is_empty() {
            return None;
        }
        Some(
            self.identifier()
                .cloned()
                .unwrap_or_else(|| self.static_type_ref()),
        )
    }

    fn declared_backing_object_id(&self) -> Option<ObjectId> {
        TypeDefinition::backing_object_id(self).cloned()
    }
}

impl SchemaDeclaration for TypeRecord {
    fn type_reference(&self) -> Option<Dxn> {
        Some(self.type_ref())
    }

    fn declared_backing_object_id(&self) -> Option<ObjectId> {
        TypeRecord::backing_object_id(self).cloned()
    }
}

impl SchemaDeclaration for Dxn {
    fn type_reference(&self) -> Option<Dxn> {
        Some(self.clone())
    }

    fn declared_backing_object_id(&self) -> Option<ObjectId> {
        if self.is_local_object() {
            self.object_id().cloned()
        } else {
            None
        }
    }
}

impl<T: SchemaDeclaration + ?Sized> SchemaDeclaration for Arc<T> {
    fn type_reference(&self) -> Option<Dxn> {
        (**self).type_reference()
    }

    fn declared_backing_object_id(&self) -> Option<ObjectId> {
        (**self).declared_backing_object_id()
    }
}

impl<T: SchemaDeclaration + ?Sized> SchemaDeclaration for &T {
    fn type_reference(&self) -> Option<Dxn> {
        (**self).type_reference()
    }

    fn declared_backing_object_id(&self) -> Option<ObjectId> {
        (**self).declared_backing_object_id()
    }
}

/// Filter selecting objects of the declared type
///
/// # Errors
///
/// `Error::Usage` when the declaration has no type reference.
pub fn schema_filter(declaration: &dyn SchemaDeclaration) -> Result<Filter> {
    declaration
        .type_reference()
        .map(Filter::type_ref)
        .ok_or_else(|| Error::usage("Schema declaration has no type reference"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_reference() {
        let def = TypeDefinition::new("a/B", "1.0.0");
        assert_eq!(def.type_reference(), Some(Dxn::typed("a/B", "1.0.0")));
        assert!(TypeDefinition::new("", "1.0.0").type_reference().is_none());

        let backed = def.with_identifier(Dxn::local_object(ObjectId::from("S")));
        assert_eq!(
            SchemaDeclaration::declared_backing_object_id(&backed),
            Some(ObjectId::from("S"))
        );
        assert_eq!(backed.type_reference().unwrap().to_string(), "dxn:echo:@:S");
    }

    #[test]
    fn test_schema_filter() {
        let filter = schema_filter(&Dxn::typed("a/B", "1.0.0")).unwrap();
        assert_eq!(filter.type_refs(), Some(&[Dxn::typed("a/B", "1.0.0")][..]));
        assert!(schema_filter(&TypeDefinition::new("", "1"))
            .unwrap_err()
            .is_usage());
    }

    #[test]
    fn test_record_declaration() {
        let record = TypeRecord::from_definition(TypeDefinition::new("a/B", "1.0.0"));
        assert_eq!(record.type_reference(), Some(Dxn::typed("a/B", "1.0.0")));
        assert!(SchemaDeclaration::declared_backing_object_id(&record).is_none());
    }
}
