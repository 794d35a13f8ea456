//! PostgreSQL transport using `tokio-postgres` and `deadpool-postgres`.
//!
//! INSERT statements compiled with a `RETURNING` clause report the returned
//! key as the generated key.

use bytes::BytesMut;
use ormkit_core::{OrmError, OrmResult};
use ormkit_db::{Database, DatabaseBackendType, ExecuteResult, GeneratedKey, Row, Value};
use tokio_postgres::types::{IsNull, ToSql, Type};

use crate::base::DatabaseConfig;

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// A NULL parameter accepted for any column type.
#[derive(Debug)]
struct SqlNull;

impl ToSql for SqlNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        self.to_sql(ty, out)
    }
}

/// A PostgreSQL database transport backed by a connection pool.
pub struct PostgresBackend {
    pool: deadpool_postgres::Pool,
}

fn map_err(e: &tokio_postgres::Error) -> OrmError {
    match e.code() {
        Some(code) if code.code().starts_with("23") => OrmError::IntegrityError(e.to_string()),
        Some(code) if code.code().starts_with("08") || code.code().starts_with("57") => {
            OrmError::OperationalError(e.to_string())
        }
        _ => OrmError::DatabaseError(e.to_string()),
    }
}

fn pool_err(e: impl std::fmt::Display) -> OrmError {
    OrmError::OperationalError(format!("Pool error: {e}"))
}

impl PostgresBackend {
    /// Wraps an existing pool.
    pub const fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }

    /// Creates a pool from a [`DatabaseConfig`]. Connections are opened
    /// lazily on first use.
    pub fn from_config(config: &DatabaseConfig) -> OrmResult<Self> {
        let mut pg_config = deadpool_postgres::Config::new();
        pg_config.dbname = Some(config.name.clone());
        pg_config.host.clone_from(&config.host);
        pg_config.port = config.port;
        pg_config.user.clone_from(&config.user);
        pg_config.password.clone_from(&config.password);
        pg_config.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections));

        let pool = pg_config
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| OrmError::OperationalError(format!("Failed to create pool: {e}")))?;
        Ok(Self { pool })
    }

    fn value_to_sql_params(params: &[Value]) -> Vec<SqlParam> {
        params
            .iter()
            .map(|v| -> SqlParam {
                match v {
                    Value::Null => Box::new(SqlNull),
                    Value::Bool(b) => Box::new(*b),
                    Value::Int(i) => Box::new(*i),
                    Value::Float(f) => Box::new(*f),
                    Value::String(s) => Box::new(s.clone()),
                    Value::Bytes(b) => Box::new(b.clone()),
                    Value::Date(d) => Box::new(*d),
                    Value::DateTime(dt) => Box::new(*dt),
                    Value::DateTimeTz(dt) => Box::new(*dt),
                    Value::Uuid(u) => Box::new(*u),
                    Value::Json(j) => Box::new(j.clone()),
                    Value::List(_) => Box::new(v.to_string()),
                }
            })
            .collect()
    }

    fn param_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
        params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }

    fn convert_row(pg_row: &tokio_postgres::Row) -> Row {
        fn read<'a, T>(row: &'a tokio_postgres::Row, i: usize, wrap: impl FnOnce(T) -> Value) -> Value
        where
            T: tokio_postgres::types::FromSql<'a>,
        {
            row.try_get::<_, Option<T>>(i)
                .ok()
                .flatten()
                .map_or(Value::Null, wrap)
        }

        let columns: Vec<String> = pg_row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let values = pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| match *col.type_() {
                Type::BOOL => read(pg_row, i, Value::Bool),
                Type::INT2 => read(pg_row, i, |v: i16| Value::Int(i64::from(v))),
                Type::INT4 => read(pg_row, i, |v: i32| Value::Int(i64::from(v))),
                Type::INT8 => read(pg_row, i, Value::Int),
                Type::FLOAT4 => read(pg_row, i, |v: f32| Value::Float(f64::from(v))),
                Type::FLOAT8 => read(pg_row, i, Value::Float),
                Type::BYTEA => read(pg_row, i, Value::Bytes),
                Type::UUID => read(pg_row, i, Value::Uuid),
                Type::DATE => read(pg_row, i, Value::Date),
                Type::TIMESTAMP => read(pg_row, i, Value::DateTime),
                Type::TIMESTAMPTZ => read(pg_row, i, Value::DateTimeTz),
                Type::JSON | Type::JSONB => read(pg_row, i, Value::Json),
                _ => read(pg_row, i, Value::String),
            })
            .collect();
        Row::new(columns, values)
    }
}

#[async_trait::async_trait]
impl Database for PostgresBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::PostgreSQL
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let client = self.pool.get().await.map_err(pool_err)?;
        let sql_params = Self::value_to_sql_params(params);
        let rows = client
            .query(sql, &Self::param_refs(&sql_params))
            .await
            .map_err(|e| map_err(&e))?;
        Ok(rows.iter().map(Self::convert_row).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<ExecuteResult> {
        let client = self.pool.get().await.map_err(pool_err)?;
        let sql_params = Self::value_to_sql_params(params);
        let refs = Self::param_refs(&sql_params);

        if sql.contains(" RETURNING ") {
            let rows = client.query(sql, &refs).await.map_err(|e| map_err(&e))?;
            let generated_key = rows
                .first()
                .map(Self::convert_row)
                .and_then(|row| row.get_value(row.columns().first()?.as_str()).cloned())
                .map_or(GeneratedKey::None, GeneratedKey::Key);
            return Ok(ExecuteResult {
                rows_affected: rows.len() as u64,
                generated_key,
            });
        }

        let rows_affected = client.execute(sql, &refs).await.map_err(|e| map_err(&e))?;
        Ok(ExecuteResult::affected(rows_affected))
    }

    /// Runs every parameter set through one prepared statement inside a
    /// transaction on a single pooled connection.
    async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> OrmResult<u64> {
        if param_sets.is_empty() {
            return Ok(0);
        }
        let mut client = self.pool.get().await.map_err(pool_err)?;
        let tx = client.transaction().await.map_err(|e| map_err(&e))?;
        let stmt = tx.prepare(sql).await.map_err(|e| map_err(&e))?;
        let mut total = 0;
        for params in param_sets {
            let sql_params = Self::value_to_sql_params(params);
            total += tx
                .execute(&stmt, &Self::param_refs(&sql_params))
                .await
                .map_err(|e| map_err(&e))?;
        }
        tx.commit().await.map_err(|e| map_err(&e))?;
        Ok(total)
    }
}
