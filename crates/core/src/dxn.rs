//! DXN: references to types and objects
//!
//! Two kinds of reference share one textual form:
//!
//! | Kind   | Form                                  | Meaning                          |
//! |--------|---------------------------------------|----------------------------------|
//! | type   | `dxn:type:<typename>[:<version>]`     | static, named type (version opt) |
//! | object | `dxn:echo:<space or @>:<object-id>`   | a stored object (e.g. a schema)  |
//!
//! Objects typed by a static definition carry a `type` DXN; objects typed by
//! a schema that lives in the database carry an `object` DXN pointing at the
//! schema's backing object. `@` stands for "the current space".

use crate::error::{Error, Result};
use crate::ids::{ObjectId, SpaceId, LOCAL_SPACE_TAG};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix shared by every DXN string.
pub const DXN_PREFIX: &str = "dxn";
/// Kind tag for static type references.
pub const TYPE_KIND: &str = "type";
/// Kind tag for object references.
pub const OBJECT_KIND: &str = "echo";

/// Typename assigned to objects that carry no type reference.
pub const UNTYPED_TYPENAME: &str = "tidepool.dev/type/Expando";

// =============================================================================
// Versions
// =============================================================================

/// True when `version` is an exact version (digits and dots only).
///
/// Anything else (`>=1.0.0`, `^0.2`, `1.x`) is treated as a range.
pub fn is_exact_version(version: &str) -> bool {
    !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Reject semver ranges.
///
/// # Errors
///
/// Returns `Error::Unsupported` when `version` is not an exact version.
pub fn ensure_exact_version(version: &str) -> Result<()> {
    if is_exact_version(version) {
        Ok(())
    } else {
        Err(Error::unsupported(format!(
            "Semver version ranges not supported: '{}'",
            version
        )))
    }
}

// =============================================================================
// Dxn
// =============================================================================

/// Reference to a type or to an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dxn {
    /// Static type reference
    Type {
        /// Namespace-qualified type name, e.g. `example.com/type/Contact`
        typename: String,
        /// Version; `None` matches any version
        version: Option<String>,
    },
    /// Reference to a stored object
    Object {
        /// Space id, or `@` for the current space
        space: String,
        /// Target object
        object_id: ObjectId,
    },
}

impl Dxn {
    /// Type reference without a version
    pub fn from_typename(typename: impl Into<String>) -> Self {
        Dxn::Type {
            typename: typename.into(),
            version: None,
        }
    }

    /// Type reference pinned to a version
    pub fn typed(typename: impl Into<String>, version: impl Into<String>) -> Self {
        Dxn::Type {
            typename: typename.into(),
            version: Some(version.into()),
        }
    }

    /// Reference to an object in the current space
    pub fn local_object(object_id: ObjectId) -> Self {
        Dxn::Object {
            space: LOCAL_SPACE_TAG.to_string(),
            object_id,
        }
    }

    /// Reference to an object in a specific space
    pub fn object(space: &SpaceId, object_id: ObjectId) -> Self {
        Dxn::Object {
            space: space.as_str().to_string(),
            object_id,
        }
    }

    /// Default type for objects without a type reference
    pub fn untyped() -> Self {
        Dxn::from_typename(UNTYPED_TYPENAME)
    }

    /// Parse a DXN string
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDxn` for unknown kinds or missing parts.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidDxn(s.to_string());
        let mut parts = s.splitn(3, ':');
        if parts.next() != Some(DXN_PREFIX) {
            return Err(invalid());
        }
        let kind = parts.next().ok_or_else(invalid)?;
        let rest = parts.next().ok_or_else(invalid)?;
        match kind {
            TYPE_KIND => {
                let (typename, version) = match rest.split_once(':') {
                    Some((name, version)) if !version.is_empty() => {
                        (name, Some(version.to_string()))
                    }
                    Some(_) => return Err(invalid()),
                    None => (rest, None),
                };
                if typename.is_empty() {
                    return Err(invalid());
                }
                Ok(Dxn::Type {
                    typename: typename.to_string(),
                    version,
                })
            }
            OBJECT_KIND => {
                let (space, id) = rest.split_once(':').ok_or_else(invalid)?;
                if space.is_empty() || id.is_empty() || id.contains(':') {
                    return Err(invalid());
                }
                Ok(Dxn::Object {
                    space: space.to_string(),
                    object_id: ObjectId::from(id),
                })
            }
            _ => Err(invalid()),
        }
    }

    /// True for static type references
    pub fn is_type(&self) -> bool {
        matches!(self, Dxn::Type { .. })
    }

    /// True for object references in the current space
    pub fn is_local_object(&self) -> bool {
        matches!(self, Dxn::Object { space, .. } if space == LOCAL_SPACE_TAG)
    }

    /// Typename of a type reference
    pub fn typename(&self) -> Option<&str> {
        match self {
            Dxn::Type { typename, .. } => Some(typename),
            Dxn::Object { .. } => None,
        }
    }

    /// Version of a type reference
    pub fn version(&self) -> Option<&str> {
        match self {
            Dxn::Type { version, .. } => version.as_deref(),
            Dxn::Object { .. } => None,
        }
    }

    /// Target of an object reference
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Dxn::Object { object_id, .. } => Some(object_id),
            Dxn::Type { .. } => None,
        }
    }

    /// Replace the local space tag with a concrete space id
    ///
    /// Type references and references to other spaces are returned unchanged.
    pub fn resolve_space(&self, space: &SpaceId) -> Dxn {
        match self {
            Dxn::Object {
                space: tag,
                object_id,
            } if tag == LOCAL_SPACE_TAG => Dxn::object(space, object_id.clone()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Dxn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dxn::Type {
                typename,
                version: Some(version),
            } => write!(f, "{}:{}:{}:{}", DXN_PREFIX, TYPE_KIND, typename, version),
            Dxn::Type {
                typename,
                version: None,
            } => write!(f, "{}:{}:{}", DXN_PREFIX, TYPE_KIND, typename),
            Dxn::Object { space, object_id } => {
                write!(f, "{}:{}:{}:{}", DXN_PREFIX, OBJECT_KIND, space, object_id)
            }
        }
    }
}

impl FromStr for Dxn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dxn::parse(s)
    }
}

impl TryFrom<String> for Dxn {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Dxn::parse(&s)
    }
}

impl From<Dxn> for String {
    fn from(dxn: Dxn) -> Self {
        dxn.to_string()
    }
}
