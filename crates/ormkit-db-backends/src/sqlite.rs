//! SQLite transport using `rusqlite`.
//!
//! The connection lives behind an async mutex and every call runs inside
//! `tokio::task::spawn_blocking`. File databases use WAL journaling; a path
//! of `:memory:` opens an in-memory database. Only statements with a
//! `RETURNING` clause report a generated key.

use std::path::PathBuf;
use std::sync::Arc;

use ormkit_core::{OrmError, OrmResult};
use ormkit_db::{Database, DatabaseBackendType, ExecuteResult, GeneratedKey, Row, Value};
use tokio::sync::Mutex;

/// A SQLite database transport.
pub struct SqliteBackend {
    path: PathBuf,
    conn: Arc<Mutex<rusqlite::Connection>>,
}

fn map_err(e: rusqlite::Error) -> OrmError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            OrmError::IntegrityError(e.to_string())
        }
        rusqlite::Error::SqliteFailure(ref err, _)
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            OrmError::OperationalError(e.to_string())
        }
        other => OrmError::DatabaseError(other.to_string()),
    }
}

fn join_err(e: tokio::task::JoinError) -> OrmError {
    OrmError::DatabaseError(format!("Task join error: {e}"))
}

impl SqliteBackend {
    /// Opens the database at `path`, creating the file if needed.
    pub fn open(path: impl Into<PathBuf>) -> OrmResult<Self> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| OrmError::OperationalError(format!("SQLite open failed: {e}")))?;

        let pragmas = if in_memory {
            "PRAGMA foreign_keys=ON;"
        } else {
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"
        };
        conn.execute_batch(pragmas)
            .map_err(|e| OrmError::OperationalError(format!("Failed to set pragmas: {e}")))?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database.
    pub fn memory() -> OrmResult<Self> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs several `;`-separated statements without parameters.
    pub async fn execute_script(&self, sql: &str) -> OrmResult<()> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || conn.blocking_lock().execute_batch(&sql).map_err(map_err))
            .await
            .map_err(join_err)?
    }

    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> OrmResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(d) => stmt.raw_bind_parameter(idx, d.to_string()),
                Value::DateTime(dt) => stmt.raw_bind_parameter(idx, dt.to_string()),
                Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339()),
                Value::Uuid(u) => stmt.raw_bind_parameter(idx, u.to_string()),
                Value::Json(j) => stmt.raw_bind_parameter(idx, j.to_string()),
                Value::List(_) => stmt.raw_bind_parameter(idx, param.to_string()),
            }
            .map_err(|e| OrmError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> OrmResult<Row> {
        let values = (0..column_names.len())
            .map(|i| {
                let value = match sqlite_row.get_ref(i).map_err(map_err)? {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) => {
                        Value::String(String::from_utf8_lossy(b).into_owned())
                    }
                    rusqlite::types::ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
                };
                Ok(value)
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Row::new(column_names.to_vec(), values))
    }
}

#[async_trait::async_trait]
impl Database for SqliteBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(map_err)?;
            let column_names: Vec<String> =
                stmt.column_names().into_iter().map(String::from).collect();
            Self::bind_params(&mut stmt, &params)?;

            let mut raw_rows = stmt.raw_query();
            let mut rows = Vec::new();
            while let Some(row) = raw_rows.next().map_err(map_err)? {
                rows.push(Self::convert_row(row, &column_names)?);
            }
            Ok(rows)
        })
        .await
        .map_err(join_err)?
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<ExecuteResult> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let params = params.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&sql).map_err(map_err)?;
            Self::bind_params(&mut stmt, &params)?;
            if !sql.contains(" RETURNING ") {
                let count = stmt.raw_execute().map_err(map_err)?;
                return Ok(ExecuteResult::affected(count as u64));
            }

            let column_names: Vec<String> =
                stmt.column_names().into_iter().map(String::from).collect();
            let mut returned = stmt.raw_query();
            let mut rows_affected = 0;
            let mut generated_key = GeneratedKey::None;
            while let Some(row) = returned.next().map_err(map_err)? {
                if rows_affected == 0 {
                    let row = Self::convert_row(row, &column_names)?;
                    if let Some(key) = column_names.first().and_then(|c| row.get_value(c)) {
                        generated_key = GeneratedKey::Key(key.clone());
                    }
                }
                rows_affected += 1;
            }
            Ok(ExecuteResult {
                rows_affected,
                generated_key,
            })
        })
        .await
        .map_err(join_err)?
    }

    /// Runs every parameter set through one prepared statement inside a
    /// transaction. A failing set rolls the whole batch back.
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> OrmResult<u64> {
        if param_sets.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let param_sets = param_sets.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let tx = conn.unchecked_transaction().map_err(map_err)?;
            let mut total = 0;
            {
                let mut stmt = tx.prepare(&sql).map_err(map_err)?;
                for params in &param_sets {
                    Self::bind_params(&mut stmt, params)?;
                    total += stmt.raw_execute().map_err(map_err)? as u64;
                }
            }
            tx.commit().map_err(map_err)?;
            Ok(total)
        })
        .await
        .map_err(join_err)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend_with_table() -> SqliteBackend {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute_script(
                "CREATE TABLE \"people\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
                 \"name\" TEXT NOT NULL UNIQUE, \"age\" INTEGER)",
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_insert_returning_reports_key() {
        let backend = backend_with_table().await;
        let sql = "INSERT INTO \"people\" (\"name\") VALUES (?) RETURNING \"id\"";
        let first = backend.execute(sql, &[Value::from("Ada")]).await.unwrap();
        let second = backend.execute(sql, &[Value::from("Grace")]).await.unwrap();
        assert_eq!(first.rows_affected, 1);
        assert_eq!(first.generated_key, GeneratedKey::Key(Value::Int(1)));
        assert_eq!(second.generated_key, GeneratedKey::Key(Value::Int(2)));
    }

    #[tokio::test]
    async fn test_insert_without_returning_reports_no_key() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute_script("CREATE TABLE \"tags\" (\"slug\" TEXT PRIMARY KEY, \"hits\" INTEGER)")
            .await
            .unwrap();
        let result = backend
            .execute(
                "INSERT INTO \"tags\" (\"slug\", \"hits\") VALUES (?, ?)",
                &[Value::from("rust"), Value::Int(3)],
            )
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.generated_key, GeneratedKey::None);
    }

    #[tokio::test]
    async fn test_update_reports_no_key() {
        let backend = backend_with_table().await;
        backend
            .execute("INSERT INTO \"people\" (\"name\") VALUES ('Ada')", &[])
            .await
            .unwrap();
        let result = backend
            .execute("UPDATE \"people\" SET \"age\" = ?", &[Value::Int(36)])
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.generated_key, GeneratedKey::None);
    }

    #[tokio::test]
    async fn test_fetch_all_and_nulls() {
        let backend = backend_with_table().await;
        backend
            .execute(
                "INSERT INTO \"people\" (\"name\", \"age\") VALUES (?, ?)",
                &[Value::from("Ada"), Value::Null],
            )
            .await
            .unwrap();
        let rows = backend
            .fetch_all("SELECT \"name\", \"age\" FROM \"people\"", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Ada");
        assert_eq!(rows[0].get::<Option<i64>>("age").unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_value() {
        let backend = backend_with_table().await;
        let value = backend
            .fetch_value("SELECT COUNT(*) FROM \"people\"", &[])
            .await
            .unwrap();
        assert_eq!(value, Value::Int(0));
    }

    #[tokio::test]
    async fn test_constraint_violation_is_integrity_error() {
        let backend = backend_with_table().await;
        let sql = "INSERT INTO \"people\" (\"name\") VALUES (?)";
        backend.execute(sql, &[Value::from("Ada")]).await.unwrap();
        let err = backend.execute(sql, &[Value::from("Ada")]).await.unwrap_err();
        assert!(matches!(err, OrmError::IntegrityError(_)));
    }

    #[tokio::test]
    async fn test_execute_many_is_atomic() {
        let backend = backend_with_table().await;
        let sql = "INSERT INTO \"people\" (\"name\") VALUES (?)";
        let n = backend
            .execute_many(sql, &[vec![Value::from("a")], vec![Value::from("b")]])
            .await
            .unwrap();
        assert_eq!(n, 2);

        let err = backend
            .execute_many(sql, &[vec![Value::from("c")], vec![Value::from("a")]])
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::IntegrityError(_)));
        let count = backend
            .fetch_value("SELECT COUNT(*) FROM \"people\"", &[])
            .await
            .unwrap();
        assert_eq!(count, Value::Int(2));
    }
}
