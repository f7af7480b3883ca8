//! Schemas stored as objects
//!
//! A stored schema is an ordinary object of the system type
//! `tidepool.dev/type/Schema` whose data holds the typename, version and
//! JSON schema of the type it defines:
//!
//! ```json
//! { "typename": "example.com/type/Contact", "version": "0.1.0",
//!   "jsonSchema": { "$id": "dxn:echo:@:<object-id>", "type": "object", ... },
//!   "name": "Contact" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidepool_core::{Dxn, ObjectId, Result};
use tidepool_query::Filter;
use tidepool_storage::{ObjectCore, ObjectDraft};

use crate::definition::TypeDefinition;
use crate::json_schema::JsonSchema;

/// Typename of stored schema objects
pub const SCHEMA_TYPENAME: &str = "tidepool.dev/type/Schema";
/// Version of the stored schema object format
pub const SCHEMA_VERSION: &str = "0.1.0";
/// Typenames hidden from schema queries unless system schemas are requested
pub const SYSTEM_TYPENAMES: &[&str] = &[SCHEMA_TYPENAME];

/// Type reference carried by stored schema objects
pub fn schema_type_ref() -> Dxn {
    Dxn::typed(SCHEMA_TYPENAME, SCHEMA_VERSION)
}

/// Filter selecting stored schema objects
pub fn stored_schema_filter() -> Filter {
    Filter::type_ref(Dxn::from_typename(SCHEMA_TYPENAME))
}

/// Definition of the stored schema object type itself
pub fn schema_type_definition() -> TypeDefinition {
    TypeDefinition::new(SCHEMA_TYPENAME, SCHEMA_VERSION).with_json_schema(
        JsonSchema {
            typename: Some(SCHEMA_TYPENAME.to_string()),
            version: Some(SCHEMA_VERSION.to_string()),
            ..JsonSchema::object()
        }
        .with_property("typename", serde_json::json!({"type": "string"}))
        .with_property("version", serde_json::json!({"type": "string"}))
        .with_property("jsonSchema", serde_json::json!({"type": "object"}))
        .with_property("name", serde_json::json!({"type": "string"}))
        .with_required("typename")
        .with_required("version")
        .with_required("jsonSchema"),
    )
}

/// True if `core` is typed as a stored schema
pub fn is_stored_schema(core: &ObjectCore) -> bool {
    core.type_ref()
        .as_ref()
        .and_then(Dxn::typename)
        .is_some_and(|typename| typename == SCHEMA_TYPENAME)
}

/// Data of a stored schema object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredSchemaData {
    /// Typename of the defined type
    #[serde(default)]
    pub typename: String,
    /// Version of the defined type
    #[serde(default)]
    pub version: String,
    /// Structural schema of the defined type
    #[serde(rename = "jsonSchema", default)]
    pub json_schema: JsonSchema,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StoredSchemaData {
    /// Decode object data, falling back to defaults for malformed fields
    pub fn decode(data: &Value) -> Self {
        let typename = data
            .get("typename")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let version = data
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let json_schema = data
            .get("jsonSchema")
            .and_then(|v| JsonSchema::from_value(v).ok())
            .unwrap_or_default();
        let name = data.get("name").and_then(Value::as_str).map(str::to_string);
        Self {
            typename,
            version,
            json_schema,
            name,
        }
    }

    /// Serialize to object data
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Draft of a new stored schema object for `definition`
    ///
    /// The object id is assigned here so the schema's `$id` can point at it.
    pub fn draft_for(definition: &TypeDefinition, name: Option<String>) -> Result<ObjectDraft> {
        let id = ObjectId::random();
        let mut json_schema = definition.json_schema().clone();
        json_schema.id = Some(Dxn::local_object(id.clone()).to_string());
        json_schema.typename = Some(definition.typename().to_string());
        json_schema.version = Some(definition.version().to_string());
        if json_schema.schema_type.is_none() {
            json_schema.schema_type = Some(crate::json_schema::OBJECT_TYPE.to_string());
        }

        let data = StoredSchemaData {
            typename: definition.typename().to_string(),
            version: definition.version().to_string(),
            json_schema,
            name,
        };
        Ok(ObjectDraft::typed(schema_type_ref(), data.to_value()?).with_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidepool_storage::{MemoryObjectStore, ObjectStore};

    #[test]
    fn test_draft_points_schema_at_object() {
        let store = MemoryObjectStore::with_random_namespace();
        let def = TypeDefinition::new("example.com/type/Contact", "0.1.0")
            .with_property("name", json!({"type": "string"}));
        let core = store
            .add(StoredSchemaData::draft_for(&def, Some("Contact".into())).unwrap())
            .unwrap();

        assert!(is_stored_schema(&core));
        let data = StoredSchemaData::decode(&core.data());
        assert_eq!(data.typename, "example.com/type/Contact");
        assert_eq!(data.name.as_deref(), Some("Contact"));
        assert_eq!(
            data.json_schema.id,
            Some(format!("dxn:echo:@:{}", core.id()))
        );
        assert_eq!(data.json_schema.check_integrity(), Ok(()));
    }

    #[test]
    fn test_decode_is_lenient() {
        let data = StoredSchemaData::decode(&json!({"typename": 5, "jsonSchema": "bad"}));
        assert_eq!(data.typename, "");
        assert_eq!(data.json_schema, JsonSchema::default());
    }

    #[test]
    fn test_other_objects_are_not_schemas() {
        let store = MemoryObjectStore::with_random_namespace();
        let core = store
            .add(ObjectDraft::typed(Dxn::typed("a/B", "1"), json!({})))
            .unwrap();
        assert!(!is_stored_schema(&core));
        let untyped = store.add(ObjectDraft::new(json!({}))).unwrap();
        assert!(!is_stored_schema(&untyped));
    }
}
