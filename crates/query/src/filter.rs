//! Filter trees over object cores
//!
//! A [`Filter`] is immutable once built. Combinators (`not`, `and`, `or`)
//! return new filters that wrap their inputs. Evaluation lives in
//! [`crate::matching`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tidepool_core::dxn::OBJECT_KIND;
use tidepool_core::reference::decode_reference;
use tidepool_core::{Dxn, Error, ForeignKey, ObjectId, Result};
use tidepool_storage::ObjectCore;

/// Custom predicate over an object core
pub type Predicate = Arc<dyn Fn(&ObjectCore) -> bool + Send + Sync>;

/// Key in a property filter that selects object ids
pub const ID_KEY: &str = "id";
/// Key in a property filter that selects typenames
pub const TYPENAME_KEY: &str = "__typename";

/// Visibility of tombstoned objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletedPolicy {
    /// Exclude deleted objects
    #[default]
    Hide,
    /// Include deleted and live objects
    Include,
    /// Only deleted objects
    Only,
}

/// Options carried by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Tombstone visibility
    #[serde(default)]
    pub deleted: DeletedPolicy,
}

impl QueryOptions {
    /// Options with the given deletion policy
    pub fn deleted(policy: DeletedPolicy) -> Self {
        Self { deleted: policy }
    }
}

/// Predicate tree over object cores
#[derive(Clone, Default)]
pub struct Filter {
    type_refs: Option<Vec<Dxn>>,
    properties: Option<Map<String, Value>>,
    object_ids: Option<Vec<ObjectId>>,
    text: Option<String>,
    meta_keys: Option<Vec<ForeignKey>>,
    predicate: Option<Predicate>,
    not: bool,
    and: Vec<Filter>,
    or: Vec<Filter>,
    options: QueryOptions,
}

impl Filter {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Matches every visible object
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches nothing
    pub fn nothing() -> Self {
        Self {
            not: true,
            ..Self::default()
        }
    }

    /// Objects whose type is compatible with `type_ref`
    pub fn type_ref(type_ref: Dxn) -> Self {
        Self {
            type_refs: Some(vec![type_ref]),
            ..Self::default()
        }
    }

    /// Objects of a static typename, any version
    ///
    /// # Errors
    ///
    /// `Error::Usage` for an empty typename or a dynamic (`dxn:echo:`) reference.
    pub fn typename(typename: &str) -> Result<Self> {
        Ok(Self::type_ref(static_typename(typename)?))
    }

    /// Objects of any of the given static typenames
    ///
    /// # Errors
    ///
    /// `Error::Usage` if any entry is a dynamic reference.
    pub fn typenames<S: AsRef<str>>(typenames: &[S]) -> Result<Self> {
        let type_refs = typenames
            .iter()
            .map(|t| static_typename(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            type_refs: Some(type_refs),
            ..Self::default()
        })
    }

    /// Objects of the type named by a DXN string
    ///
    /// # Errors
    ///
    /// `Error::Usage` for an empty string, `Error::InvalidDxn` if it does not parse.
    pub fn type_dxn(dxn: &str) -> Result<Self> {
        if dxn.is_empty() {
            return Err(Error::usage("`dxn` parameter is required."));
        }
        Ok(Self::type_ref(Dxn::parse(dxn)?))
    }

    /// Objects whose top-level properties equal the given values
    pub fn properties(properties: Map<String, Value>) -> Self {
        Self {
            properties: Some(properties),
            ..Self::default()
        }
    }

    /// Objects with one of the given ids
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ObjectId>,
    {
        Self {
            object_ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Objects tagged with one of the given foreign keys
    pub fn foreign_keys(keys: Vec<ForeignKey>) -> Self {
        Self {
            meta_keys: Some(keys),
            ..Self::default()
        }
    }

    /// Full-text filter
    ///
    /// Evaluating it fails with `Error::Unsupported`.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Objects accepted by a custom predicate
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&ObjectCore) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
            ..Self::default()
        }
    }

    /// Negation of `filter`; keeps its options
    pub fn not(filter: Filter) -> Self {
        Self {
            not: !filter.not,
            ..filter
        }
    }

    /// Objects matching every filter
    pub fn and(filters: Vec<Filter>) -> Self {
        Self {
            and: filters,
            ..Self::default()
        }
    }

    /// Objects matching at least one filter
    pub fn or(filters: Vec<Filter>) -> Self {
        Self {
            or: filters,
            ..Self::default()
        }
    }

    /// Build from a property filter object
    ///
    /// Recognized keys: `id` (string, encoded reference or array of them) and
    /// `__typename` (string or array; `dxn:` strings are parsed). Every other
    /// key is a property equality constraint.
    ///
    /// # Errors
    ///
    /// `Error::Usage` if `source` is not an object, if ids are malformed, or
    /// if a single id is combined with other constraints.
    pub fn from_property_filter(source: &Value) -> Result<Self> {
        let Value::Object(source) = source else {
            return Err(Error::usage("property filter must be an object"));
        };

        let mut properties = source.clone();
        let id = properties.remove(ID_KEY);
        let typename = properties.remove(TYPENAME_KEY);

        let exclusive_id = match &id {
            Some(Value::Array(ids)) => ids.len() > 1,
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        if exclusive_id && (typename.is_some() || !properties.is_empty()) {
            return Err(Error::usage("Cannot specify id with other properties."));
        }

        let type_refs = match typename {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(vec![parse_typename(&name)?]),
            Some(Value::Array(names)) => Some(
                names
                    .iter()
                    .map(|name| match name {
                        Value::String(name) => parse_typename(name),
                        _ => Err(Error::usage("`__typename` entries must be strings")),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(_) => return Err(Error::usage("`__typename` must be a string or array")),
        };

        let object_ids = match id {
            None | Some(Value::Null) => None,
            Some(id) => Some(sanitize_ids(&id)?),
        };

        Ok(Self {
            type_refs,
            properties: Some(properties),
            object_ids,
            ..Self::default()
        })
    }

    // =========================================================================
    // Refinement
    // =========================================================================

    /// Same filter with additional property constraints
    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        match &mut self.properties {
            Some(existing) => existing.extend(properties),
            None => self.properties = Some(properties),
        }
        self
    }

    /// Same filter with a custom predicate
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ObjectCore) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Same filter with different options
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// True if the filter selects by object id
    pub fn is_object_id_filter(&self) -> bool {
        self.object_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }

    /// Type constraints
    pub fn type_refs(&self) -> Option<&[Dxn]> {
        self.type_refs.as_deref()
    }

    /// Property constraints
    pub fn property_constraints(&self) -> Option<&Map<String, Value>> {
        self.properties.as_ref()
    }

    /// Id constraints
    pub fn object_ids(&self) -> Option<&[ObjectId]> {
        self.object_ids.as_deref()
    }

    /// Full-text constraint
    pub fn text_query(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Foreign key constraints
    pub fn meta_keys(&self) -> Option<&[ForeignKey]> {
        self.meta_keys.as_deref()
    }

    /// Custom predicate
    pub fn custom_predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// True if the result is negated
    pub fn is_negated(&self) -> bool {
        self.not
    }

    /// Conjunction children
    pub fn and_filters(&self) -> &[Filter] {
        &self.and
    }

    /// Disjunction children
    pub fn or_filters(&self) -> &[Filter] {
        &self.or
    }

    /// Options
    pub fn options(&self) -> QueryOptions {
        self.options
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Filter");
        if let Some(types) = &self.type_refs {
            d.field("type", &types.iter().map(ToString::to_string).collect::<Vec<_>>());
        }
        if let Some(properties) = &self.properties {
            d.field("properties", properties);
        }
        if let Some(ids) = &self.object_ids {
            d.field("object_ids", ids);
        }
        if let Some(text) = &self.text {
            d.field("text", text);
        }
        if let Some(keys) = &self.meta_keys {
            d.field("meta_keys", keys);
        }
        if self.predicate.is_some() {
            d.field("predicate", &"<fn>");
        }
        if self.not {
            d.field("not", &true);
        }
        if !self.and.is_empty() {
            d.field("and", &self.and);
        }
        if !self.or.is_empty() {
            d.field("or", &self.or);
        }
        d.field("options", &self.options).finish()
    }
}

fn static_typename(typename: &str) -> Result<Dxn> {
    if typename.is_empty() {
        return Err(Error::usage("`typename` parameter is required."));
    }
    if typename.starts_with(&format!("dxn:{}:", OBJECT_KIND)) {
        return Err(Error::usage("Dynamic schema references are not allowed."));
    }
    Ok(Dxn::from_typename(typename))
}

fn parse_typename(name: &str) -> Result<Dxn> {
    if name.starts_with("dxn:") {
        Dxn::parse(name)
    } else {
        Ok(Dxn::from_typename(name))
    }
}

fn sanitize_ids(ids: &Value) -> Result<Vec<ObjectId>> {
    let items: Vec<&Value> = match ids {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    items.into_iter().map(sanitize_id).collect()
}

fn sanitize_id(id: &Value) -> Result<ObjectId> {
    let dxn = match id {
        Value::String(s) if !s.starts_with("dxn:") => return Ok(ObjectId::from(s.as_str())),
        Value::String(s) => Dxn::parse(s)?,
        other => decode_reference(other)
            .ok_or_else(|| Error::usage("id must be a string or an encoded reference"))?,
    };
    if !dxn.is_local_object() {
        return Err(Error::usage("Only local space references are supported"));
    }
    dxn.object_id()
        .cloned()
        .ok_or_else(|| Error::usage("id reference must point at an object"))
}
