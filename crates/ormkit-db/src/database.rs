//! Database transport trait.
//!
//! [`Database`] is the bridge between the query layer (`ormkit-db`) and the
//! concrete transports (`ormkit-db-backends`, `ormkit-test`). Terminal
//! operations of a [`QuerySet`](crate::query::QuerySet) accept
//! `&dyn Database`, which transports implement. Transport failures are
//! surfaced unchanged.

use ormkit_core::{OrmError, OrmResult};

use crate::query::compiler::{DatabaseBackendType, Row};
use crate::value::Value;

/// The key a database generated for an inserted row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GeneratedKey {
    /// The transport did not report a key.
    #[default]
    None,
    /// The reported key.
    Key(Value),
}

impl GeneratedKey {
    /// Returns the key value, if one was reported and it is not NULL.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Key(v) if !v.is_null() => Some(v),
            _ => None,
        }
    }
}

/// The outcome of a statement that does not return rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecuteResult {
    /// Number of rows the statement touched.
    pub rows_affected: u64,
    /// Key generated by an INSERT.
    pub generated_key: GeneratedKey,
}

impl ExecuteResult {
    /// A result with no generated key.
    pub const fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            generated_key: GeneratedKey::None,
        }
    }
}

/// Minimal async database transport.
#[async_trait::async_trait]
pub trait Database: Send + Sync {
    /// Returns the backend type for SQL compilation.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a query and returns all result rows.
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>>;

    /// Runs a query and returns the first column of its first row.
    async fn fetch_value(&self, sql: &str, params: &[Value]) -> OrmResult<Value> {
        let rows = self.fetch_all(sql, params).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::DatabaseError("Query returned no rows".to_string()))?;
        row.get_by_index::<Value>(0)
    }

    /// Runs a statement that does not return rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<ExecuteResult>;

    /// Runs one statement once per parameter set and returns the total
    /// number of affected rows.
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> OrmResult<u64> {
        let mut total = 0;
        for params in param_sets {
            total += self.execute(sql, params).await?.rows_affected;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Scripted {
        rows: Vec<Row>,
        executed: Mutex<Vec<Vec<Value>>>,
    }

    #[async_trait::async_trait]
    impl Database for Scripted {
        fn backend_type(&self) -> DatabaseBackendType {
            DatabaseBackendType::SQLite
        }

        async fn fetch_all(&self, _sql: &str, _params: &[Value]) -> OrmResult<Vec<Row>> {
            Ok(self.rows.clone())
        }

        async fn execute(&self, _sql: &str, params: &[Value]) -> OrmResult<ExecuteResult> {
            self.executed.lock().await.push(params.to_vec());
            Ok(ExecuteResult::affected(1))
        }
    }

    #[tokio::test]
    async fn test_fetch_value_reads_first_column() {
        let db = Scripted {
            rows: vec![Row::from_pairs([("count", Value::Int(4))])],
            executed: Mutex::new(vec![]),
        };
        assert_eq!(db.fetch_value("SELECT 4", &[]).await.unwrap(), Value::Int(4));
    }

    #[tokio::test]
    async fn test_fetch_value_without_rows_fails() {
        let db = Scripted {
            rows: vec![],
            executed: Mutex::new(vec![]),
        };
        assert!(db.fetch_value("SELECT 1", &[]).await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_execute_many_runs_each_set() {
        let db = Scripted {
            rows: vec![],
            executed: Mutex::new(vec![]),
        };
        let total = db
            .execute_many("UPDATE", &[vec![Value::Int(1)], vec![Value::Int(2)]])
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(db.executed.lock().await.len(), 2);
    }

    #[test]
    fn test_generated_key_value() {
        assert_eq!(GeneratedKey::None.value(), None);
        assert_eq!(GeneratedKey::Key(Value::Null).value(), None);
        assert_eq!(
            GeneratedKey::Key(Value::Int(9)).value(),
            Some(&Value::Int(9))
        );
    }
}
