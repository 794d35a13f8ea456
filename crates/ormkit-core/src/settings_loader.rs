//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `ORMKIT_DEBUG` | `debug` |
//! | `ORMKIT_LOG_LEVEL` | `log_level` |
//! | `ORMKIT_DATABASE_ENGINE` | `databases.default.engine` |
//! | `ORMKIT_DATABASE_NAME` | `databases.default.name` |
//! | `ORMKIT_DATABASE_HOST` | `databases.default.host` |
//! | `ORMKIT_DATABASE_PORT` | `databases.default.port` |
//! | `ORMKIT_DATABASE_USER` | `databases.default.user` |
//! | `ORMKIT_DATABASE_PASSWORD` | `databases.default.password` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use ormkit_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/ormkit.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::{OrmError, OrmResult};
use crate::settings::Settings;

const ENV_PREFIX: &str = "ORMKIT_";

/// Loads settings from a TOML string. Keys missing from the TOML keep their
/// default values.
pub fn from_toml_str(toml_str: &str) -> OrmResult<Settings> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| OrmError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> OrmResult<Settings> {
    from_toml_str(&read_file(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> OrmResult<Settings> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> OrmResult<Settings> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| OrmError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> OrmResult<Settings> {
    from_json_str(&read_file(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> OrmResult<Settings> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `ORMKIT_*` environment variable overrides to a settings struct.
///
/// Database overrides target the `default` alias. Unparseable numeric values
/// are ignored.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides_from(settings, |key| std::env::var(format!("{ENV_PREFIX}{key}")).ok());
}

fn apply_overrides_from(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = lookup("LOG_LEVEL") {
        settings.log_level = val;
    }

    let db = settings.database_mut("default");

    if let Some(val) = lookup("DATABASE_ENGINE") {
        db.engine = val;
    }
    if let Some(val) = lookup("DATABASE_NAME") {
        db.name = val;
    }
    if let Some(val) = lookup("DATABASE_HOST") {
        db.host = val;
    }
    if let Some(val) = lookup("DATABASE_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            db.port = port;
        }
    }
    if let Some(val) = lookup("DATABASE_USER") {
        db.user = val;
    }
    if let Some(val) = lookup("DATABASE_PASSWORD") {
        db.password = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_file(path: &Path, format: &str) -> OrmResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        OrmError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> OrmResult<Settings> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        OrmError::SerializationError(format!("Failed to serialize default settings: {e}"))
    })?;

    serde_json::from_value(merge_json(default_json, value)).map_err(|e| {
        OrmError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
///
/// Database entries that only name some keys are completed from the default
/// database entry, so a file may declare `[databases.replica]` with just a
/// `name`.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            let template = base_map
                .get("databases")
                .and_then(|dbs| dbs.get("default"))
                .cloned();
            for (key, override_v) in override_map {
                let merged = match (key.as_str(), base_map.remove(&key), &template) {
                    ("databases", Some(base_v), Some(template)) => {
                        merge_databases(base_v, override_v, template)
                    }
                    (_, Some(base_v), _) => merge_json(base_v, override_v),
                    (_, None, _) => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

fn merge_databases(
    base: serde_json::Value,
    override_val: serde_json::Value,
    template: &serde_json::Value,
) -> serde_json::Value {
    let serde_json::Value::Object(override_map) = override_val else {
        return override_val;
    };
    let serde_json::Value::Object(mut base_map) = base else {
        return serde_json::Value::Object(override_map);
    };
    for (alias, entry) in override_map {
        let start = base_map.remove(&alias).unwrap_or_else(|| template.clone());
        base_map.insert(alias, merge_json(start, entry));
    }
    serde_json::Value::Object(base_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_basic() {
        let toml = r#"
            debug = false
            log_level = "ormkit_db=debug"
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "ormkit_db=debug");
        // Defaults preserved
        assert_eq!(settings.database("default").unwrap().engine, "sqlite");
    }

    #[test]
    fn test_from_toml_str_databases() {
        let toml = r#"
            [databases.default]
            engine = "postgresql"
            name = "mydb"
            user = "myuser"
            password = "mypass"
            host = "localhost"
            port = 5432
        "#;

        let settings = from_toml_str(toml).unwrap();
        let db = settings.database("default").unwrap();
        assert_eq!(db.engine, "postgresql");
        assert_eq!(db.name, "mydb");
        assert_eq!(db.user, "myuser");
        assert_eq!(db.port, 5432);
        assert_eq!(db.max_connections, 16);
    }

    #[test]
    fn test_from_toml_str_partial_extra_database() {
        let toml = r#"
            [databases.replica]
            name = "replica.sqlite3"
        "#;

        let settings = from_toml_str(toml).unwrap();
        let replica = settings.database("replica").unwrap();
        assert_eq!(replica.name, "replica.sqlite3");
        assert_eq!(replica.engine, "sqlite");
        assert!(settings.database("default").is_some());
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert!(settings.debug);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(matches!(result, Err(OrmError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_extra() {
        let toml = r#"
            [extra]
            slow_query_ms = 250
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.extra["slow_query_ms"], 250);
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{"debug": false, "log_level": "debug"}"#;

        let settings = from_json_str(json).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_from_json_str_databases() {
        let json = r#"{
            "databases": {
                "default": {
                    "engine": "postgresql",
                    "host": "db.example.com",
                    "port": 5432
                }
            }
        }"#;

        let settings = from_json_str(json).unwrap();
        let db = settings.database("default").unwrap();
        assert_eq!(db.engine, "postgresql");
        assert_eq!(db.host, "db.example.com");
        assert_eq!(db.name, "db.sqlite3");
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{invalid json").is_err());
    }

    // ── File loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_file() {
        let dir = std::env::temp_dir().join("ormkit_test_toml");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(&path, "debug = false\nlog_level = \"warn\"\n").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "warn");

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_from_json_file() {
        let dir = std::env::temp_dir().join("ormkit_test_json");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        std::fs::write(&path, r#"{"log_level": "trace"}"#).unwrap();

        let settings = from_json_file(&path).unwrap();
        assert_eq!(settings.log_level, "trace");

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_from_toml_file_missing() {
        let result = from_toml_file("/nonexistent/path/settings.toml");
        assert!(matches!(result, Err(OrmError::ConfigurationError(_))));
    }

    // ── Environment overrides ───────────────────────────────────────

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_debug_and_log_level() {
        let mut settings = Settings::default();
        apply_overrides_from(
            &mut settings,
            lookup_from(&[("DEBUG", "false"), ("LOG_LEVEL", "debug")]),
        );
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_overrides_debug_truthy_values() {
        for value in ["true", "1", "YES"] {
            let mut settings = Settings::default();
            settings.debug = false;
            apply_overrides_from(&mut settings, lookup_from(&[("DEBUG", value)]));
            assert!(settings.debug, "{value} should enable debug");
        }
    }

    #[test]
    fn test_overrides_database() {
        let mut settings = Settings::default();
        apply_overrides_from(
            &mut settings,
            lookup_from(&[
                ("DATABASE_ENGINE", "postgresql"),
                ("DATABASE_NAME", "app"),
                ("DATABASE_HOST", "db"),
                ("DATABASE_PORT", "6432"),
                ("DATABASE_USER", "svc"),
                ("DATABASE_PASSWORD", "pw"),
            ]),
        );
        let db = settings.database("default").unwrap();
        assert_eq!(db.engine, "postgresql");
        assert_eq!(db.name, "app");
        assert_eq!(db.host, "db");
        assert_eq!(db.port, 6432);
        assert_eq!(db.user, "svc");
        assert_eq!(db.password, "pw");
    }

    #[test]
    fn test_overrides_invalid_port_ignored() {
        let mut settings = Settings::default();
        apply_overrides_from(&mut settings, lookup_from(&[("DATABASE_PORT", "not-a-port")]));
        assert_eq!(settings.database("default").unwrap().port, 0);
    }

    #[test]
    fn test_apply_env_overrides_reads_prefixed_vars() {
        std::env::set_var("ORMKIT_LOG_LEVEL", "ormkit=trace");
        let settings = from_env();
        std::env::remove_var("ORMKIT_LOG_LEVEL");
        assert_eq!(settings.log_level, "ormkit=trace");
    }

    // ── merge_json helper ───────────────────────────────────────────

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"outer": {"a": 1, "b": 2}});
        let over = serde_json::json!({"outer": {"b": 3}});
        let merged = merge_json(base, over);
        assert_eq!(merged["outer"]["a"], 1);
        assert_eq!(merged["outer"]["b"], 3);
    }

    #[test]
    fn test_merge_json_array_override() {
        let base = serde_json::json!({"list": [1, 2, 3]});
        let over = serde_json::json!({"list": [4, 5]});
        let merged = merge_json(base, over);
        assert_eq!(merged["list"], serde_json::json!([4, 5]));
    }

    #[test]
    fn test_toml_to_json() {
        let toml_val: toml::Value = toml::from_str(
            r#"
            name = "test"
            count = 42
            items = [1, 2, 3]
            [nested]
            key = "value"
        "#,
        )
        .unwrap();

        let json = toml_to_json(toml_val);
        assert_eq!(json["name"], "test");
        assert_eq!(json["count"], 42);
        assert_eq!(json["items"], serde_json::json!([1, 2, 3]));
        assert_eq!(json["nested"]["key"], "value");
    }
}
