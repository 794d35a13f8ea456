//! # ormkit-db-backends
//!
//! Transports implementing [`ormkit_db::Database`]:
//!
//! - `SQLite` via `rusqlite` (feature `sqlite`, enabled by default)
//! - `PostgreSQL` via `tokio-postgres` and `deadpool-postgres` (feature `postgres`)
//!
//! [`connect`] opens the transport described by a [`DatabaseConfig`].

#![allow(clippy::doc_markdown)]
#![allow(clippy::significant_drop_tightening)]

pub mod base;
#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{connect, DatabaseConfig};
#[cfg(feature = "postgres")]
pub use postgresql::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
