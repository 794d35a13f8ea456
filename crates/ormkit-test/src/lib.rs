//! # ormkit-test
//!
//! Database test utilities for ormkit: an in-memory SQLite
//! [`TestDatabase`](test_database::TestDatabase) that logs every statement,
//! and query-count assertions for catching accidental extra round trips.

pub mod assert_queries;
pub mod test_database;

pub use assert_queries::{assert_max_queries, assert_num_queries};
pub use test_database::TestDatabase;
