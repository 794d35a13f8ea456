//! # ormkit-db
//!
//! Query layer of ormkit. A [`QuerySet`](query::QuerySet) is an immutable
//! description of a query over one [`Model`](model::Model): filter and
//! exclude clauses, related paths to join, and a result window. Chain methods
//! return new specifications; terminal methods compile a statement, run it
//! through a [`Database`](database::Database) transport and turn the rows
//! back into models.
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`fields`] - Field definitions ([`FieldDef`](fields::FieldDef)) and types
//! - [`entity`] - Per-model metadata: fields, key, relations
//! - [`model`] - The [`Model`](model::Model) trait, records and keyword mappings
//! - [`database`] - The async transport trait
//! - [`query`] - Predicates, statements, compilation, materialization, execution

// - struct_excessive_bools: FieldDef carries several independent flags
// - too_many_lines: the SQL compiler match arms are long
// - cast_precision_loss: integer-to-float coercion of result values
// - result_large_err: OrmError is the one error type across the crate
// - format_push_string: format! with push_str reads better for SQL generation
// - doc_markdown: backtick requirements for documentation items are too strict
// - needless_pass_by_value: keyword mappings are taken by value on purpose
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]

pub mod database;
pub mod entity;
pub mod fields;
pub mod model;
pub mod query;
pub mod value;

pub use database::{Database, ExecuteResult, GeneratedKey};
pub use entity::{EntityBuilder, EntityMeta, RelationDef, RelationKind};
pub use fields::{DefaultProvider, FieldDef, FieldType};
pub use model::{FieldValue, Fields, ForeignKey, Model, Record, RelatedValue};
pub use query::{
    query_for, DatabaseBackendType, FromValue, Lookup, LookupBuilder, PredicateBuilder, QuerySet,
    Row, SqlCompiler, WhereNode,
};
pub use value::{Value, ValueKind};
