//! Filters and reactive queries for Tidepool
//!
//! This crate provides:
//! - Filter: immutable predicate trees over object cores
//! - matches: the evaluation order for filters (deletion policy first, negation last)
//! - PreparedQuery: reference-counted reactive query handle over a Resolver
//! - ObjectQueryResolver: store-backed resolver with dependency tracking

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod matching;
pub mod object_query;
pub mod prepared;

pub use filter::{DeletedPolicy, Filter, Predicate, QueryOptions};
pub use matching::{compare_type, matches, MatchContext};
pub use object_query::{query_objects, ObjectQueryResolver};
pub use prepared::{PreparedQuery, QueryCallback, QuerySubscription, Resolver, SubscribeOptions};
