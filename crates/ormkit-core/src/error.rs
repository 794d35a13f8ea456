//! Core error types for ormkit.
//!
//! Every fallible operation in the workspace returns [`OrmResult`]. The
//! variants of [`OrmError`] fall into three groups: query outcome errors
//! raised by the query layer itself, definition errors raised while
//! describing entities and relations, and transport errors produced by a
//! database backend and propagated unchanged.

use thiserror::Error;

/// The primary error type for ormkit.
#[derive(Error, Debug)]
pub enum OrmError {
    // ── Query outcome ────────────────────────────────────────────────

    /// A single-result operation matched zero rows.
    #[error("No match: {0}")]
    NoMatch(String),

    /// A single-result operation matched more than one row.
    #[error("Multiple matches: {0}")]
    MultipleMatches(String),

    /// The query was used in a way it does not support, such as an
    /// unscoped mutation or a lookup that names an unknown field.
    #[error("Query definition error: {0}")]
    QueryDefinition(String),

    // ── Definitions ──────────────────────────────────────────────────

    /// Entity metadata is invalid (missing or duplicate primary key, ...).
    #[error("Model definition error: {0}")]
    ModelDefinition(String),

    /// A related object or key does not fit the relation it was passed for.
    #[error("Relationship error: {0}")]
    Relationship(String),

    // ── Transport ────────────────────────────────────────────────────

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrmError {
    /// Returns `true` for errors that originate from the database transport.
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::IntegrityError(_) | Self::OperationalError(_)
        )
    }
}

/// A convenience type alias for `Result<T, OrmError>`.
pub type OrmResult<T> = Result<T, OrmError>;
