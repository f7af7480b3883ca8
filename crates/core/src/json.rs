//! Paths into structured object data
//!
//! Object data is a JSON object keyed by property name. Properties are
//! addressed with dotted/bracket paths (`name`, `address.city`,
//! `emails[0].value`), parsed into a [`JsonPath`].
//!
//! # Path Syntax
//!
//! | Syntax       | Meaning          | Example        |
//! |--------------|------------------|----------------|
//! | `key`        | Object property  | `name`         |
//! | `.key`       | Object property  | `.name`        |
//! | `[n]`        | Array index      | `[0]`          |
//! | `a.b[n].c`   | Mixed            | `emails[0].to` |
//! | (empty)      | Root             | ``             |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// PathSegment / JsonPath
// =============================================================================

/// A segment in a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, ".{}", k),
            PathSegment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A path into object data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    /// The root path
    pub fn root() -> Self {
        JsonPath {
            segments: Vec::new(),
        }
    }

    /// Path from segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        JsonPath { segments }
    }

    /// Path segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// True for the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a key segment
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Key(key.into()));
        self
    }

    /// Append an index segment
    pub fn index(mut self, idx: usize) -> Self {
        self.segments.push(PathSegment::Index(idx));
        self
    }

    /// Parent path, `None` for root
    pub fn parent(&self) -> Option<JsonPath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(JsonPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// First key segment, if the path starts with one
    pub fn first_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl FromStr for JsonPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(JsonPath::root());
        }

        let invalid = |msg: String| Error::InvalidPath(format!("'{}': {}", s, msg));
        let chars: Vec<char> = s.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        if chars[0] == '.' {
            i += 1;
        }

        while i < chars.len() {
            if chars[i] == '.' {
                i += 1;
                if i >= chars.len() {
                    return Err(invalid(format!("empty key at position {}", i)));
                }
            }

            if chars[i] == '[' {
                let start = i;
                i += 1;
                let idx_start = i;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(invalid(format!("unclosed bracket at position {}", start)));
                }
                let idx_str: String = chars[idx_start..i].iter().collect();
                let idx = idx_str
                    .parse::<usize>()
                    .map_err(|_| invalid(format!("invalid index '{}'", idx_str)))?;
                segments.push(PathSegment::Index(idx));
                i += 1;
            } else if is_key_char(chars[i]) {
                let key_start = i;
                while i < chars.len() && is_key_char(chars[i]) {
                    i += 1;
                }
                segments.push(PathSegment::Key(chars[key_start..i].iter().collect()));
            } else {
                return Err(invalid(format!(
                    "unexpected character '{}' at position {}",
                    chars[i], i
                )));
            }
        }

        Ok(JsonPath { segments })
    }
}

fn is_key_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(k) if i == 0 => write!(f, "{}", k)?,
                other => write!(f, "{}", other)?,
            }
        }
        Ok(())
    }
}

impl From<&str> for JsonPath {
    /// Single-key path. Use `str::parse` for nested paths.
    fn from(key: &str) -> Self {
        JsonPath::root().key(key)
    }
}

// =============================================================================
// Path Operations
// =============================================================================

/// Value at `path`, or `None` when the path does not exist
pub fn get_at_path<'a>(value: &'a Value, path: &JsonPath) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.segments() {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(obj)) => obj.get(key)?,
            (PathSegment::Index(idx), Value::Array(arr)) => arr.get(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set the value at `path`, creating intermediate containers
///
/// The container created for a missing intermediate is decided by the next
/// segment (object for a key, array for an index). Appending at
/// `len` of an array pushes.
///
/// # Errors
///
/// Returns `Error::InvalidPath` on a type mismatch or an index past the end.
pub fn set_at_path(root: &mut Value, path: &JsonPath, value: Value) -> Result<()> {
    let segments = path.segments();
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for (i, segment) in parents.iter().enumerate() {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(obj)) => {
                obj.entry(key.clone()).or_insert_with(|| match segments[i + 1] {
                    PathSegment::Key(_) => Value::Object(Map::new()),
                    PathSegment::Index(_) => Value::Array(Vec::new()),
                })
            }
            (PathSegment::Index(idx), Value::Array(arr)) => {
                let len = arr.len();
                arr.get_mut(*idx).ok_or_else(|| out_of_bounds(path, *idx, len))?
            }
            (segment, other) => return Err(mismatch(path, segment, other)),
        };
    }

    match (last, current) {
        (PathSegment::Key(key), Value::Object(obj)) => {
            obj.insert(key.clone(), value);
            Ok(())
        }
        (PathSegment::Index(idx), Value::Array(arr)) => {
            if *idx < arr.len() {
                arr[*idx] = value;
                Ok(())
            } else if *idx == arr.len() {
                arr.push(value);
                Ok(())
            } else {
                Err(out_of_bounds(path, *idx, arr.len()))
            }
        }
        (segment, other) => Err(mismatch(path, segment, other)),
    }
}

/// Remove the value at `path`, returning it
///
/// Removing the root replaces it with null.
pub fn delete_at_path(root: &mut Value, path: &JsonPath) -> Option<Value> {
    let segments = path.segments();
    let Some((last, parents)) = segments.split_last() else {
        return Some(std::mem::take(root));
    };

    let mut current = root;
    for segment in parents {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(obj)) => obj.get_mut(key)?,
            (PathSegment::Index(idx), Value::Array(arr)) => arr.get_mut(*idx)?,
            _ => return None,
        };
    }

    match (last, current) {
        (PathSegment::Key(key), Value::Object(obj)) => obj.remove(key),
        (PathSegment::Index(idx), Value::Array(arr)) if *idx < arr.len() => Some(arr.remove(*idx)),
        _ => None,
    }
}

fn out_of_bounds(path: &JsonPath, index: usize, len: usize) -> Error {
    Error::InvalidPath(format!(
        "'{}': index {} out of bounds (len {})",
        path, index, len
    ))
}

fn mismatch(path: &JsonPath, segment: &PathSegment, found: &Value) -> Error {
    let expected = match segment {
        PathSegment::Key(_) => "object",
        PathSegment::Index(_) => "array",
    };
    Error::InvalidPath(format!(
        "'{}': expected {}, found {}",
        path,
        expected,
        value_type_name(found)
    ))
}

/// Name of a JSON value's type, for messages
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
