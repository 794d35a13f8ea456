//! Connection configuration and transport construction.

use std::collections::HashMap;
use std::sync::Arc;

use ormkit_core::{DatabaseSettings, OrmError, OrmResult};
use ormkit_db::{Database, DatabaseBackendType};

/// Configuration for connecting to a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// The backend type.
    pub backend: DatabaseBackendType,
    /// The database name or file path.
    pub name: String,
    /// The database host (for network-based backends).
    pub host: Option<String>,
    /// The database port.
    pub port: Option<u16>,
    /// The database user.
    pub user: Option<String>,
    /// The database password.
    pub password: Option<String>,
    /// Maximum pooled connections for network backends.
    pub max_connections: usize,
    /// Additional connection options.
    pub options: HashMap<String, String>,
}

impl DatabaseConfig {
    fn local(backend: DatabaseBackendType, name: String) -> Self {
        Self {
            backend,
            name,
            host: None,
            port: None,
            user: None,
            password: None,
            max_connections: 1,
            options: HashMap::new(),
        }
    }

    /// Creates a configuration for an in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self::local(DatabaseBackendType::SQLite, ":memory:".to_string())
    }

    /// Creates a configuration for a SQLite file database.
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        Self::local(DatabaseBackendType::SQLite, path.into())
    }

    /// Creates a configuration for a PostgreSQL database.
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            backend: DatabaseBackendType::PostgreSQL,
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
            user: Some(user.into()),
            password: Some(password.into()),
            max_connections: 16,
            options: HashMap::new(),
        }
    }

    /// Builds a configuration from loaded settings.
    ///
    /// Empty strings and a zero port are treated as unset.
    pub fn from_settings(settings: &DatabaseSettings) -> OrmResult<Self> {
        let backend = match settings.engine.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => DatabaseBackendType::SQLite,
            "postgres" | "postgresql" => DatabaseBackendType::PostgreSQL,
            other => {
                return Err(OrmError::ConfigurationError(format!(
                    "Unsupported database engine '{other}'"
                )))
            }
        };
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Ok(Self {
            backend,
            name: settings.name.clone(),
            host: non_empty(&settings.host),
            port: (settings.port != 0).then_some(settings.port),
            user: non_empty(&settings.user),
            password: non_empty(&settings.password),
            max_connections: settings.max_connections.max(1),
            options: settings.options.clone(),
        })
    }
}

/// Opens a transport for `config`.
///
/// Fails with `ConfigurationError` when the backend's feature is not
/// compiled in.
pub fn connect(config: &DatabaseConfig) -> OrmResult<Arc<dyn Database>> {
    tracing::debug!(backend = ?config.backend, name = %config.name, "opening database");
    match config.backend {
        #[cfg(feature = "sqlite")]
        DatabaseBackendType::SQLite => Ok(Arc::new(crate::sqlite::SqliteBackend::open(&config.name)?)),
        #[cfg(feature = "postgres")]
        DatabaseBackendType::PostgreSQL => Ok(Arc::new(
            crate::postgresql::PostgresBackend::from_config(config)?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(OrmError::ConfigurationError(format!(
            "Backend {other:?} is not enabled in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_sqlite_memory() {
        let cfg = DatabaseConfig::sqlite_memory();
        assert_eq!(cfg.backend, DatabaseBackendType::SQLite);
        assert_eq!(cfg.name, ":memory:");
        assert!(cfg.host.is_none());
    }

    #[test]
    fn test_database_config_postgres() {
        let cfg = DatabaseConfig::postgres("shop", "localhost", 5432, "app", "secret");
        assert_eq!(cfg.backend, DatabaseBackendType::PostgreSQL);
        assert_eq!(cfg.host.as_deref(), Some("localhost"));
        assert_eq!(cfg.port, Some(5432));
    }

    #[test]
    fn test_from_settings() {
        let settings = DatabaseSettings {
            engine: "PostgreSQL".into(),
            name: "shop".into(),
            host: "db".into(),
            port: 5433,
            ..DatabaseSettings::default()
        };
        let cfg = DatabaseConfig::from_settings(&settings).unwrap();
        assert_eq!(cfg.backend, DatabaseBackendType::PostgreSQL);
        assert_eq!(cfg.host.as_deref(), Some("db"));
        assert_eq!(cfg.port, Some(5433));
        assert!(cfg.user.is_none());
    }

    #[test]
    fn test_from_settings_unknown_engine() {
        let settings = DatabaseSettings {
            engine: "oracle".into(),
            ..DatabaseSettings::default()
        };
        let err = DatabaseConfig::from_settings(&settings).unwrap_err();
        assert!(matches!(err, OrmError::ConfigurationError(_)));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_connect_sqlite() {
        let db = connect(&DatabaseConfig::sqlite_memory()).unwrap();
        assert_eq!(db.backend_type(), DatabaseBackendType::SQLite);
    }
}
