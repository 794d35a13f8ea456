//! Settings for ormkit.
//!
//! [`Settings`] holds logging options and the named database connections an
//! application uses. Settings are usually produced by
//! [`settings_loader`](crate::settings_loader) from a TOML or JSON file with
//! environment overrides applied on top.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine: `sqlite` or `postgresql`.
    pub engine: String,
    /// The database name (or file path for `SQLite`).
    pub name: String,
    /// The database user.
    pub user: String,
    /// The database password.
    pub password: String,
    /// The database host.
    pub host: String,
    /// The database port.
    pub port: u16,
    /// Maximum number of pooled connections for network backends.
    pub max_connections: usize,
    /// Additional engine-specific options.
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: "db.sqlite3".to_string(),
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            max_connections: 16,
            options: HashMap::new(),
        }
    }
}

/// The complete set of ormkit settings.
///
/// # Examples
///
/// ```
/// use ormkit_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.log_level, "info");
/// assert!(settings.database("default").is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled. Selects pretty log output.
    pub debug: bool,

    /// The log filter directive (e.g. "info", "ormkit_db=debug").
    pub log_level: String,

    /// Database configurations, keyed by alias (e.g. "default").
    pub databases: HashMap<String, DatabaseSettings>,

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = HashMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());

        Self {
            debug: true,
            log_level: "info".to_string(),
            databases,
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    /// Returns the database configured under `alias`.
    pub fn database(&self, alias: &str) -> Option<&DatabaseSettings> {
        self.databases.get(alias)
    }

    /// Returns the database configured under `alias`, creating a default entry
    /// if none exists yet.
    pub fn database_mut(&mut self, alias: &str) -> &mut DatabaseSettings {
        self.databases.entry(alias.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert!(s.extra.is_empty());
    }

    #[test]
    fn test_default_database() {
        let s = Settings::default();
        let db = s.database("default").expect("default db should exist");
        assert_eq!(db.engine, "sqlite");
        assert_eq!(db.name, "db.sqlite3");
        assert_eq!(db.max_connections, 16);
    }

    #[test]
    fn test_database_mut_creates_entry() {
        let mut s = Settings::default();
        s.database_mut("replica").name = "replica.sqlite3".to_string();
        assert_eq!(s.database("replica").unwrap().name, "replica.sqlite3");
        assert_eq!(s.database("replica").unwrap().engine, "sqlite");
    }
}
