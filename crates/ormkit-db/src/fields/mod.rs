//! Field definitions and types.
//!
//! [`FieldDef`] describes one persisted column of an entity and
//! [`FieldType`] its storage type.

pub mod types;

pub use types::{DefaultProvider, FieldDef, FieldType};
