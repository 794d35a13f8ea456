//! Test database utilities.
//!
//! Provides [`TestDatabase`], an in-memory SQLite transport for tests. It
//! implements [`Database`] so every query set operation can run against it,
//! records each statement it is handed, and can create tables straight from
//! entity metadata.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ormkit_test::TestDatabase;
//!
//! async fn example() {
//!     let db = TestDatabase::new();
//!     db.execute_raw("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
//!         .await
//!         .unwrap();
//!     assert_eq!(db.query_count(), 1);
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ormkit_core::OrmResult;
use ormkit_db::{Database, DatabaseBackendType, EntityMeta, ExecuteResult, Row, Value};
use ormkit_db_backends::SqliteBackend;
use tokio::sync::Mutex;

/// An in-memory SQLite database for testing.
///
/// Clones share the same connection, counter, and statement log. Every
/// `TestDatabase::new()` call creates a fresh, isolated database.
#[derive(Clone)]
pub struct TestDatabase {
    backend: Arc<SqliteBackend>,
    query_count: Arc<AtomicUsize>,
    statements: Arc<Mutex<Vec<String>>>,
}

impl TestDatabase {
    /// Creates a new in-memory SQLite test database.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory database cannot be created.
    pub fn new() -> Self {
        let backend = SqliteBackend::memory().expect("Failed to create in-memory SQLite database");
        Self {
            backend: Arc::new(backend),
            query_count: Arc::new(AtomicUsize::new(0)),
            statements: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates the table of `meta`.
    pub async fn setup_table(&self, meta: &EntityMeta) -> OrmResult<()> {
        self.execute_raw(&Self::create_table_sql(meta)).await
    }

    /// Creates the tables of several entities, in order.
    pub async fn setup_tables(&self, metas: &[&EntityMeta]) -> OrmResult<()> {
        for meta in metas {
            self.setup_table(meta).await?;
        }
        Ok(())
    }

    /// Drops every user table.
    pub async fn teardown(&self) -> OrmResult<()> {
        let rows = self
            .backend
            .fetch_all(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                &[],
            )
            .await?;
        let drops: Vec<String> = rows
            .iter()
            .map(|row| {
                row.get::<String>("name")
                    .map(|table| format!("DROP TABLE IF EXISTS \"{table}\";"))
            })
            .collect::<OrmResult<_>>()?;
        self.backend
            .execute_script(&format!("PRAGMA foreign_keys=OFF; {} PRAGMA foreign_keys=ON;", drops.join(" ")))
            .await
    }

    /// Runs raw SQL without parameters. Counts as one query.
    pub async fn execute_raw(&self, sql: &str) -> OrmResult<()> {
        self.record(sql).await;
        self.backend.execute_script(sql).await
    }

    /// Returns the number of statements run so far.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Resets the query counter and clears the statement log.
    pub async fn reset(&self) {
        self.query_count.store(0, Ordering::Relaxed);
        self.statements.lock().await.clear();
    }

    /// Resets the query counter to zero.
    pub fn reset_query_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }

    /// Returns the SQL of every statement run so far, oldest first.
    pub async fn statements(&self) -> Vec<String> {
        self.statements.lock().await.clone()
    }

    /// Returns the inner transport.
    pub fn backend(&self) -> &SqliteBackend {
        &self.backend
    }

    /// Generates a `CREATE TABLE IF NOT EXISTS` statement from entity metadata.
    pub fn create_table_sql(meta: &EntityMeta) -> String {
        let columns: Vec<String> = meta
            .fields
            .iter()
            .map(|field| {
                let mut parts = vec![format!(
                    "\"{}\" {}",
                    field.column,
                    field.field_type.sqlite_column_type()
                )];
                if field.primary_key {
                    parts.push("PRIMARY KEY".to_string());
                    if field.autoincrement && field.field_type.is_auto() {
                        parts.push("AUTOINCREMENT".to_string());
                    }
                } else if !field.null {
                    parts.push("NOT NULL".to_string());
                }
                if let Some(target) = field.target() {
                    parts.push(format!(
                        "REFERENCES \"{}\" (\"{}\")",
                        target.table,
                        target.pk_column()
                    ));
                }
                parts.join(" ")
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            meta.table,
            columns.join(", ")
        )
    }

    async fn record(&self, sql: &str) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.statements.lock().await.push(sql.to_string());
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Database for TestDatabase {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        self.record(sql).await;
        self.backend.fetch_all(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<ExecuteResult> {
        self.record(sql).await;
        self.backend.execute(sql, params).await
    }

    /// A batch counts as one query.
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> OrmResult<u64> {
        self.record(sql).await;
        self.backend.execute_many(sql, param_sets).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormkit_db::{FieldDef, FieldType, GeneratedKey};
    use std::sync::LazyLock;

    fn shelf_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("Shelf")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("label", FieldType::CharField))
                .build()
                .unwrap()
        });
        &META
    }

    fn jar_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("Jar")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("weight", FieldType::FloatField).nullable())
                .field(FieldDef::foreign_key("shelf", shelf_meta).column("shelf_id"))
                .build()
                .unwrap()
        });
        &META
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            TestDatabase::create_table_sql(jar_meta()),
            "CREATE TABLE IF NOT EXISTS \"jars\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"weight\" REAL, \"shelf_id\" INTEGER NOT NULL REFERENCES \"shelfs\" (\"id\"))"
        );
    }

    #[tokio::test]
    async fn test_setup_and_insert() {
        let db = TestDatabase::new();
        db.setup_tables(&[shelf_meta(), jar_meta()]).await.unwrap();
        let result = db
            .execute(
                "INSERT INTO \"shelfs\" (\"label\") VALUES (?) RETURNING \"id\"",
                &[Value::from("top")],
            )
            .await
            .unwrap();
        assert_eq!(result.generated_key, GeneratedKey::Key(Value::Int(1)));

        let rows = db
            .fetch_all("SELECT \"label\" FROM \"shelfs\"", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].get::<String>("label").unwrap(), "top");
    }

    #[tokio::test]
    async fn test_query_counter_and_log() {
        let db = TestDatabase::new();
        db.setup_table(shelf_meta()).await.unwrap();
        db.execute_many(
            "INSERT INTO \"shelfs\" (\"label\") VALUES (?)",
            &[vec![Value::from("a")], vec![Value::from("b")]],
        )
        .await
        .unwrap();
        assert_eq!(db.query_count(), 2);
        let log = db.statements().await;
        assert!(log[0].starts_with("CREATE TABLE"));

        db.reset().await;
        assert_eq!(db.query_count(), 0);
        assert!(db.statements().await.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_drops_tables() {
        let db = TestDatabase::new();
        db.setup_tables(&[shelf_meta(), jar_meta()]).await.unwrap();
        db.teardown().await.unwrap();
        let err = db.fetch_all("SELECT * FROM \"jars\"", &[]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let db = TestDatabase::new();
        let other = db.clone();
        db.setup_table(shelf_meta()).await.unwrap();
        assert!(other.fetch_all("SELECT * FROM \"shelfs\"", &[]).await.is_ok());
        assert_eq!(db.query_count(), other.query_count());
    }
}
