//! Static type definitions

use serde_json::Value;
use tidepool_core::{Dxn, ObjectId};

use crate::json_schema::JsonSchema;

/// Immutable, in-memory type definition
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    typename: String,
    version: String,
    json_schema: JsonSchema,
    identifier: Option<Dxn>,
}

impl TypeDefinition {
    /// Definition with an empty object schema
    pub fn new(typename: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            version: version.into(),
            json_schema: JsonSchema::object(),
            identifier: None,
        }
    }

    /// Replace the structural schema
    pub fn with_json_schema(mut self, json_schema: JsonSchema) -> Self {
        self.json_schema = json_schema;
        self
    }

    /// Add a property schema
    pub fn with_property(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.json_schema.properties.insert(name.into(), schema);
        self
    }

    /// Attach the reference of the stored schema this definition came from
    pub fn with_identifier(mut self, identifier: Dxn) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Namespace-qualified type name
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// Version string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Structural schema
    pub fn json_schema(&self) -> &JsonSchema {
        &self.json_schema
    }

    /// Reference of the backing stored schema, if any
    pub fn identifier(&self) -> Option<&Dxn> {
        self.identifier.as_ref()
    }

    /// Id of the backing object, if the identifier is a local object reference
    pub fn backing_object_id(&self) -> Option<&ObjectId> {
        self.identifier
            .as_ref()
            .filter(|dxn| dxn.is_local_object())
            .and_then(Dxn::object_id)
    }

    /// Static type reference, `dxn:type:<typename>:<version>`
    pub fn static_type_ref(&self) -> Dxn {
        Dxn::typed(self.typename.clone(), self.version.clone())
    }
}
