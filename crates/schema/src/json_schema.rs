//! Structural schema representation
//!
//! A [`JsonSchema`] is the JSON-Schema document describing a type. The
//! well-known keys are typed fields; anything else is preserved in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tidepool_core::{Error, Result};

/// Shape of an object schema
pub const OBJECT_TYPE: &str = "object";

/// JSON-Schema document for a type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Identifier; `dxn:echo:@:<id>` for schemas stored in the database
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// JSON type of instances, `object` for valid type schemas
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Typename annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typename: Option<String>,
    /// Version annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Property schemas
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    /// Required property names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Other keywords, preserved as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reason a stored schema fails the integrity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// `$id` is missing or empty
    MissingIdentifier,
    /// `type` is not `object`
    NotObject,
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::MissingIdentifier => f.write_str("schema is missing $id"),
            IntegrityIssue::NotObject => f.write_str("schema is not of object type"),
        }
    }
}

impl JsonSchema {
    /// Empty object schema
    pub fn object() -> Self {
        Self {
            schema_type: Some(OBJECT_TYPE.to_string()),
            ..Self::default()
        }
    }

    /// Add a property schema
    pub fn with_property(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark a property as required
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    /// Parse from a JSON value
    ///
    /// # Errors
    ///
    /// `Error::Usage` if `value` is not an object; `Error::Serialization` if
    /// a well-known key has the wrong type.
    pub fn from_value(value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::usage("JSON schema must be an object"));
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Serialize to a JSON value
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }

    /// True for `type: object`
    pub fn is_object(&self) -> bool {
        self.schema_type.as_deref() == Some(OBJECT_TYPE)
    }

    /// Property names in declaration order
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Check the shape required of stored schemas
    pub fn check_integrity(&self) -> std::result::Result<(), IntegrityIssue> {
        if self.id.as_deref().map_or(true, str::is_empty) {
            return Err(IntegrityIssue::MissingIdentifier);
        }
        if !self.is_object() {
            return Err(IntegrityIssue::NotObject);
        }
        Ok(())
    }
}
