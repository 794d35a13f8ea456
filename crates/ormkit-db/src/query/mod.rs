//! Query building, compilation, and execution.
//!
//! - [`lookups`] - Lookup operators for filtering
//! - [`clause`] - Keyword predicates to WHERE nodes
//! - [`statement`] - Statement AST and the statement builder
//! - [`compiler`] - SQL compilation and result rows
//! - [`materialize`] - Row materialization and fan-out merging
//! - [`queryset`] - The immutable [`QuerySet`] and its read operations
//! - [`writes`] - Inserts, updates, and deletes on a [`QuerySet`]

pub mod clause;
pub mod compiler;
pub mod lookups;
pub mod materialize;
pub mod queryset;
pub mod statement;
pub mod writes;

#[cfg(test)]
pub(crate) mod test_support;

pub use clause::{LookupBuilder, PredicateBuilder};
pub use compiler::{DatabaseBackendType, FromValue, Row, SqlCompiler};
pub use lookups::Lookup;
pub use queryset::{query_for, IntoRelationPaths, QuerySet};
pub use statement::{build_select, ColumnRef, MutationScope, SelectStatement, WhereNode};
