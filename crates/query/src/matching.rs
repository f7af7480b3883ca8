//! Filter evaluation
//!
//! [`matches`] evaluates a [`Filter`] against one object core in a fixed order:
//!
//! 1. deletion policy (a hidden object never matches, even under `not`)
//! 2. inner evaluation:
//!    - id membership decides alone when present
//!    - `or` children decide alone when present (any child matches)
//!    - type compatibility (untyped objects use the `Expando` type)
//!    - property equality (references compare by target identity)
//!    - foreign keys (any listed key present)
//!    - full text (unsupported, fails)
//!    - custom predicate, evaluated without dependency tracking
//!    - `and` children (all must match)
//! 3. negation of the inner result
//!
//! Children of `and`/`or` are evaluated as complete filters with their own
//! options.

use serde_json::Value;
use tidepool_core::reference::decode_reference;
use tidepool_core::tracking::untracked;
use tidepool_core::{ensure_exact_version, Dxn, Error, JsonPath, Result, SpaceId};
use tidepool_storage::ObjectCore;

use crate::filter::{DeletedPolicy, Filter};

/// Environment of an evaluation
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    /// Namespace that local (`@`) references resolve to
    pub namespace: &'a SpaceId,
}

impl<'a> MatchContext<'a> {
    /// Context for `namespace`
    pub fn new(namespace: &'a SpaceId) -> Self {
        Self { namespace }
    }
}

/// True if `core` matches `filter`
///
/// # Errors
///
/// `Error::Unsupported` for full-text filters and semver version ranges.
pub fn matches(filter: &Filter, core: &ObjectCore, ctx: &MatchContext<'_>) -> Result<bool> {
    let deleted = core.is_deleted();
    let visible = match filter.options().deleted {
        DeletedPolicy::Hide => !deleted,
        DeletedPolicy::Include => true,
        DeletedPolicy::Only => deleted,
    };
    if !visible {
        return Ok(false);
    }

    let result = matches_inner(filter, core, ctx)?;
    Ok(if filter.is_negated() { !result } else { result })
}

fn matches_inner(filter: &Filter, core: &ObjectCore, ctx: &MatchContext<'_>) -> Result<bool> {
    if filter.is_object_id_filter() {
        let ids = filter.object_ids().unwrap_or_default();
        return Ok(ids.contains(core.id()));
    }

    if !filter.or_filters().is_empty() {
        for child in filter.or_filters() {
            if matches(child, core, ctx)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if let Some(type_refs) = filter.type_refs() {
        let actual = core.type_ref().unwrap_or_else(Dxn::untyped);
        let mut any = false;
        for expected in type_refs {
            if compare_type(expected, &actual, ctx)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }

    if let Some(properties) = filter.property_constraints() {
        for (key, expected) in properties {
            let actual = core.get(&JsonPath::from(key.as_str()));
            if !values_equal(expected, actual.as_ref(), ctx) {
                return Ok(false);
            }
        }
    }

    if let Some(keys) = filter.meta_keys() {
        if !keys.is_empty() {
            let meta = core.meta();
            if !keys.iter().any(|key| meta.contains(key)) {
                return Ok(false);
            }
        }
    }

    if filter.text_query().is_some() {
        return Err(Error::unsupported("Text search is not supported."));
    }

    if let Some(predicate) = filter.custom_predicate() {
        if !untracked(|| predicate(core)) {
            return Ok(false);
        }
    }

    for child in filter.and_filters() {
        if !matches(child, core, ctx)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// True if an object typed `actual` satisfies the type constraint `expected`
///
/// Static types match on typename; versions must be equal when both sides
/// carry one. Object references match on target identity after resolving
/// the local space tag.
///
/// # Errors
///
/// `Error::Unsupported` when `expected` carries a version range.
pub fn compare_type(expected: &Dxn, actual: &Dxn, ctx: &MatchContext<'_>) -> Result<bool> {
    if let Some(version) = expected.version() {
        ensure_exact_version(version)?;
    }

    match (expected, actual) {
        (
            Dxn::Type {
                typename: expected_name,
                version: expected_version,
            },
            Dxn::Type {
                typename: actual_name,
                version: actual_version,
            },
        ) => {
            if expected_name != actual_name {
                return Ok(false);
            }
            Ok(match (expected_version, actual_version) {
                (Some(e), Some(a)) => e == a,
                _ => true,
            })
        }
        (Dxn::Object { .. }, Dxn::Object { .. }) => {
            Ok(expected.resolve_space(ctx.namespace) == actual.resolve_space(ctx.namespace))
        }
        _ => Ok(false),
    }
}

fn values_equal(expected: &Value, actual: Option<&Value>, ctx: &MatchContext<'_>) -> bool {
    if let Some(expected_ref) = decode_reference(expected) {
        return actual
            .and_then(decode_reference)
            .map(|actual_ref| {
                expected_ref.resolve_space(ctx.namespace) == actual_ref.resolve_space(ctx.namespace)
            })
            .unwrap_or(false);
    }
    actual == Some(expected)
}
