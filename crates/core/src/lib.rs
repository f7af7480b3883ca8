//! Core types for Tidepool
//!
//! This crate defines the foundational types used throughout the system:
//! - ObjectId / SpaceId: object and namespace identity
//! - Dxn: references to types and stored objects
//! - ObjectMeta / ForeignKey: provenance tags
//! - Encoded references inside object data
//! - JsonPath: addressing into object data
//! - Event / Subscription: typed observer lists
//! - tracking: read-dependency collection for reactive queries
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dxn;
pub mod error;
pub mod event;
pub mod ids;
pub mod json;
pub mod meta;
pub mod reference;
pub mod tracking;

pub use dxn::{ensure_exact_version, is_exact_version, Dxn, UNTYPED_TYPENAME};
pub use error::{Error, Result};
pub use event::{Event, Listener, ListenerId, Subscription};
pub use ids::{ObjectId, SpaceId, LOCAL_SPACE_TAG};
pub use json::{delete_at_path, get_at_path, set_at_path, JsonPath, PathSegment};
pub use meta::{ForeignKey, ObjectMeta};
pub use reference::{decode_reference, encode_reference, is_encoded_reference, REFERENCE_KEY};
