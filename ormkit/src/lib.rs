//! # ormkit
//!
//! An immutable query builder and async execution layer for relational
//! databases.
//!
//! This is the meta-crate re-exporting the sub-crates. Depend on `ormkit` for
//! everything, or on individual crates for finer-grained control.
//!
//! ```rust,no_run
//! use ormkit::prelude::*;
//!
//! fn open() -> OrmResult<std::sync::Arc<dyn Database>> {
//!     let settings = ormkit::core::settings_loader::from_env();
//!     ormkit::core::logging::setup_logging(&settings);
//!     let db_settings = settings
//!         .database("default")
//!         .ok_or_else(|| OrmError::ConfigurationError("no default database".into()))?;
//!     connect(&DatabaseConfig::from_settings(db_settings)?)
//! }
//! ```

/// Error types, settings, and logging setup.
pub use ormkit_core as core;

/// Values, entity metadata, models, and query sets.
pub use ormkit_db as db;

/// `SQLite` and `PostgreSQL` transports.
pub use ormkit_db_backends as db_backends;

/// Test database and query-count assertions.
#[cfg(feature = "testing")]
pub use ormkit_test as test;

// Third-party re-exports
pub use async_trait;
pub use chrono;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use uuid;

/// The types most applications need.
pub mod prelude {
    pub use ormkit_core::{OrmError, OrmResult, Settings};
    pub use ormkit_db::{
        query_for, Database, EntityMeta, FieldDef, FieldType, Fields, ForeignKey, Model,
        QuerySet, Record, RelatedValue, Value,
    };
    pub use ormkit_db_backends::{connect, DatabaseConfig};
}
