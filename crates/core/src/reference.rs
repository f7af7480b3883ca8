//! Encoded references inside object data
//!
//! A property whose value points at another object is stored as a single-key
//! JSON object: `{"/": "dxn:echo:@:<object-id>"}`. Equality on such values is
//! identity of the target, not structure of the payload.

use crate::dxn::Dxn;
use serde_json::{Map, Value};

/// Key of the single entry in an encoded reference.
pub const REFERENCE_KEY: &str = "/";

/// Encode a reference as a JSON value
pub fn encode_reference(target: &Dxn) -> Value {
    let mut map = Map::new();
    map.insert(REFERENCE_KEY.to_string(), Value::String(target.to_string()));
    Value::Object(map)
}

/// True if `value` has the shape of an encoded reference
pub fn is_encoded_reference(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.len() == 1 && matches!(map.get(REFERENCE_KEY), Some(Value::String(_)))
        }
        _ => false,
    }
}

/// Decode an encoded reference
///
/// Returns `None` for values that are not references or whose DXN is malformed.
pub fn decode_reference(value: &Value) -> Option<Dxn> {
    if !is_encoded_reference(value) {
        return None;
    }
    value
        .get(REFERENCE_KEY)
        .and_then(Value::as_str)
        .and_then(|s| Dxn::parse(s).ok())
}
