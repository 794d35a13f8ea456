//! SQL compiler and result rows.
//!
//! The [`SqlCompiler`] translates the statement AST of
//! [`statement`](super::statement) into parameterized SQL. PostgreSQL uses
//! numbered placeholders (`$1, $2, ...`), SQLite and MySQL use `?`.
//! Identifiers are double-quoted on every backend.

use ormkit_core::OrmError;

use super::lookups::Lookup;
use super::statement::{
    BulkUpdateStatement, ColumnRef, DeleteStatement, InsertStatement, MutationScope,
    SelectStatement, UpdateStatement, WhereNode,
};
use crate::value::Value;

/// The type of database backend, used by the compiler to generate
/// backend-specific SQL syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackendType {
    /// PostgreSQL (uses `$1, $2, ...` placeholders).
    PostgreSQL,
    /// SQLite (uses `?` placeholders).
    SQLite,
    /// MySQL (uses `?` placeholders).
    MySQL,
}

/// A single row returned by a query.
///
/// `Row` holds a list of column labels and their corresponding values. It
/// provides typed access via the [`get`](Row::get) method.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from column labels and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Builds a row from `(label, value)` pairs.
    pub fn from_pairs<K: Into<String>, V: Into<Value>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    /// Returns the column labels.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column label.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist or the value cannot be
    /// converted to the requested type.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T, OrmError> {
        let value = self.get_value(column).ok_or_else(|| {
            OrmError::DatabaseError(format!("Column '{column}' not found in row"))
        })?;
        T::from_value(value)
    }

    /// Gets a typed value by column index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the value cannot be
    /// converted to the requested type.
    pub fn get_by_index<T: FromValue>(&self, idx: usize) -> Result<T, OrmError> {
        let value = self.values.get(idx).ok_or_else(|| {
            OrmError::DatabaseError(format!(
                "Column index {idx} out of bounds (row has {} columns)",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Returns a reference to the raw value under the given label.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> Result<Self, OrmError>;
}

fn mismatch(expected: &str, value: &Value) -> OrmError {
    OrmError::DatabaseError(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Int(i) => i32::try_from(*i)
                .map_err(|e| OrmError::DatabaseError(format!("Int value out of i32 range: {e}"))),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Int(i) => u64::try_from(*i)
                .map_err(|e| OrmError::DatabaseError(format!("Int value out of u64 range: {e}"))),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(mismatch("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Bool(b) => Ok(*b),
            // SQLite has no boolean storage class.
            Value::Int(i) => Ok(*i != 0),
            _ => Err(mismatch("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => uuid::Uuid::parse_str(s)
                .map_err(|e| OrmError::DatabaseError(format!("Invalid UUID '{s}': {e}"))),
            _ => Err(mismatch("Uuid", value)),
        }
    }
}

impl FromValue for chrono::NaiveDate {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value.clone().coerce(crate::value::ValueKind::Date) {
            Value::Date(d) => Ok(d),
            _ => Err(mismatch("Date", value)),
        }
    }
}

impl FromValue for chrono::NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value.clone().coerce(crate::value::ValueKind::DateTime) {
            Value::DateTime(dt) => Ok(dt),
            _ => Err(mismatch("DateTime", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, OrmError> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

/// The SQL compiler translates statements into parameterized SQL.
///
/// Different backends use different placeholder styles:
/// - PostgreSQL: `$1, $2, $3, ...`
/// - SQLite / MySQL: `?, ?, ?, ...`
#[derive(Debug, Clone, Copy)]
pub struct SqlCompiler {
    backend: DatabaseBackendType,
}

/// Escapes the LIKE wildcards and the escape character in a pattern operand.
fn like_escape(value: &str) -> String {
    let text = value.to_string();
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl SqlCompiler {
    /// Creates a new compiler for the given backend type.
    pub const fn new(backend: DatabaseBackendType) -> Self {
        Self { backend }
    }

    /// Returns the backend this compiler targets.
    pub const fn backend(&self) -> DatabaseBackendType {
        self.backend
    }

    /// Returns a parameter placeholder for the given 1-based index.
    fn placeholder(&self, index: usize) -> String {
        match self.backend {
            DatabaseBackendType::PostgreSQL => format!("${index}"),
            DatabaseBackendType::SQLite | DatabaseBackendType::MySQL => "?".to_string(),
        }
    }

    fn push_param(&self, params: &mut Vec<Value>, value: Value) -> String {
        params.push(value);
        self.placeholder(params.len())
    }

    fn qualified(table: &str, column: &ColumnRef) -> String {
        let owner = column.path.as_deref().unwrap_or(table);
        format!("\"{owner}\".\"{}\"", column.column)
    }

    /// Compiles a SELECT statement into SQL and parameters.
    pub fn compile_select(&self, stmt: &SelectStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.select_sql(stmt, &mut params);
        (sql, params)
    }

    /// Compiles a SELECT wrapped in a row count.
    pub fn compile_count(&self, stmt: &SelectStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let inner = self.select_sql(stmt, &mut params);
        (
            format!("SELECT COUNT(*) AS \"count\" FROM ({inner}) AS \"subquery_for_count\""),
            params,
        )
    }

    /// Compiles a SELECT wrapped in an existence test.
    pub fn compile_exists(&self, stmt: &SelectStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let inner = self.select_sql(stmt, &mut params);
        (format!("SELECT EXISTS({inner}) AS \"exists\""), params)
    }

    fn select_sql(&self, stmt: &SelectStatement, params: &mut Vec<Value>) -> String {
        let table = stmt.table.as_str();
        let columns: Vec<String> = stmt
            .columns
            .iter()
            .map(|col| format!("{} AS \"{}\"", Self::qualified(table, &col.source), col.label))
            .collect();
        let mut sql = format!("SELECT {} FROM \"{table}\"", columns.join(", "));

        for join in &stmt.joins {
            sql.push_str(&format!(
                " LEFT OUTER JOIN \"{}\" AS \"{}\" ON {} = \"{}\".\"{}\"",
                join.table,
                join.alias,
                Self::qualified(table, &join.parent),
                join.alias,
                join.column
            ));
        }

        if let Some(ref where_clause) = stmt.where_clause {
            sql.push_str(" WHERE ");
            self.compile_where_node(table, where_clause, &mut sql, params);
        }

        if !stmt.order_by.is_empty() {
            let orders: Vec<String> = stmt
                .order_by
                .iter()
                .map(|o| {
                    let dir = if o.descending { " DESC" } else { " ASC" };
                    format!("{}{dir}", Self::qualified(table, &o.column))
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        match (stmt.limit, stmt.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {limit}"));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            (None, Some(offset)) => match self.backend {
                DatabaseBackendType::PostgreSQL => sql.push_str(&format!(" OFFSET {offset}")),
                DatabaseBackendType::SQLite => {
                    sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
                }
                DatabaseBackendType::MySQL => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {offset}", u64::MAX));
                }
            },
            (None, None) => {}
        }

        sql
    }

    /// Compiles an INSERT statement.
    pub fn compile_insert(&self, stmt: &InsertStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let columns: Vec<&str> = stmt.values.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders: Vec<String> = stmt
            .values
            .iter()
            .map(|(_, v)| self.push_param(&mut params, v.clone()))
            .collect();
        let mut sql = self.insert_sql(&stmt.table, &columns, &placeholders);
        match (&stmt.returning, self.backend) {
            (Some(returning), DatabaseBackendType::PostgreSQL | DatabaseBackendType::SQLite) => {
                sql.push_str(&format!(" RETURNING \"{returning}\""));
            }
            _ => {}
        }
        (sql, params)
    }

    /// Compiles a single-row INSERT run once per parameter set.
    pub fn compile_insert_template(&self, table: &str, columns: &[&str]) -> String {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
        self.insert_sql(table, columns, &placeholders)
    }

    fn insert_sql(&self, table: &str, columns: &[&str], placeholders: &[String]) -> String {
        if columns.is_empty() {
            return match self.backend {
                DatabaseBackendType::MySQL => format!("INSERT INTO \"{table}\" () VALUES ()"),
                _ => format!("INSERT INTO \"{table}\" DEFAULT VALUES"),
            };
        }
        let columns: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// Compiles an UPDATE statement.
    pub fn compile_update(&self, stmt: &UpdateStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let set_parts: Vec<String> = stmt
            .assignments
            .iter()
            .map(|(column, value)| {
                let ph = self.push_param(&mut params, value.clone());
                format!("\"{column}\" = {ph}")
            })
            .collect();
        let mut sql = format!("UPDATE \"{}\" SET {}", stmt.table, set_parts.join(", "));
        self.compile_scope(&stmt.table, &stmt.scope, &mut sql, &mut params);
        (sql, params)
    }

    /// Compiles a DELETE statement.
    pub fn compile_delete(&self, stmt: &DeleteStatement) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM \"{}\"", stmt.table);
        self.compile_scope(&stmt.table, &stmt.scope, &mut sql, &mut params);
        (sql, params)
    }

    /// Compiles the per-object UPDATE of a bulk update.
    pub fn compile_bulk_update(&self, stmt: &BulkUpdateStatement) -> String {
        let set_parts: Vec<String> = stmt
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("\"{column}\" = {}", self.placeholder(i + 1)))
            .collect();
        format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = {}",
            stmt.table,
            set_parts.join(", "),
            stmt.pk_column,
            self.placeholder(stmt.columns.len() + 1)
        )
    }

    fn compile_scope(
        &self,
        table: &str,
        scope: &MutationScope,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        match scope {
            MutationScope::All => {}
            MutationScope::Where(node) => {
                sql.push_str(" WHERE ");
                self.compile_where_node(table, node, sql, params);
            }
            MutationScope::Subquery { pk_column, select } => {
                let inner = self.select_sql(select, params);
                sql.push_str(&format!(" WHERE \"{pk_column}\" IN ({inner})"));
            }
        }
    }

    /// Compiles a `WhereNode` into SQL, appending to the provided string.
    fn compile_where_node(
        &self,
        table: &str,
        node: &WhereNode,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        match node {
            WhereNode::Condition { column, lookup } => {
                let column = Self::qualified(table, column);
                self.compile_lookup(&column, lookup, sql, params);
            }
            WhereNode::And(children) => {
                if children.is_empty() {
                    sql.push_str("1=1");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" AND ");
                    }
                    self.compile_where_node(table, child, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Or(children) => {
                if children.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                sql.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(" OR ");
                    }
                    self.compile_where_node(table, child, sql, params);
                }
                sql.push(')');
            }
            WhereNode::Not(inner) => {
                sql.push_str("NOT (");
                self.compile_where_node(table, inner, sql, params);
                sql.push(')');
            }
        }
    }

    fn compile_like(
        &self,
        column: &str,
        pattern: String,
        insensitive: bool,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        let ph = self.push_param(params, Value::String(pattern));
        let escape = match self.backend {
            DatabaseBackendType::MySQL => r"'\\'",
            _ => r"'\'",
        };
        match (insensitive, self.backend) {
            (false, _) => sql.push_str(&format!("{column} LIKE {ph} ESCAPE {escape}")),
            (true, DatabaseBackendType::PostgreSQL) => {
                sql.push_str(&format!("{column} ILIKE {ph} ESCAPE {escape}"));
            }
            (true, _) => {
                sql.push_str(&format!("LOWER({column}) LIKE LOWER({ph}) ESCAPE {escape}"));
            }
        }
    }

    /// Compiles a single lookup against an already quoted column.
    fn compile_lookup(
        &self,
        column: &str,
        lookup: &Lookup,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) {
        match lookup {
            Lookup::Exact(val) => {
                if val.is_null() {
                    sql.push_str(&format!("{column} IS NULL"));
                } else {
                    let ph = self.push_param(params, val.clone());
                    sql.push_str(&format!("{column} = {ph}"));
                }
            }
            Lookup::IExact(val) => {
                let ph = self.push_param(params, val.clone());
                sql.push_str(&format!("LOWER({column}) = LOWER({ph})"));
            }
            Lookup::Contains(val) => {
                self.compile_like(column, format!("%{}%", like_escape(val)), false, sql, params);
            }
            Lookup::IContains(val) => {
                self.compile_like(column, format!("%{}%", like_escape(val)), true, sql, params);
            }
            Lookup::In(vals) => {
                if vals.is_empty() {
                    sql.push_str("1=0");
                    return;
                }
                let placeholders: Vec<String> = vals
                    .iter()
                    .map(|v| self.push_param(params, v.clone()))
                    .collect();
                sql.push_str(&format!("{column} IN ({})", placeholders.join(", ")));
            }
            Lookup::Gt(val) => {
                let ph = self.push_param(params, val.clone());
                sql.push_str(&format!("{column} > {ph}"));
            }
            Lookup::Gte(val) => {
                let ph = self.push_param(params, val.clone());
                sql.push_str(&format!("{column} >= {ph}"));
            }
            Lookup::Lt(val) => {
                let ph = self.push_param(params, val.clone());
                sql.push_str(&format!("{column} < {ph}"));
            }
            Lookup::Lte(val) => {
                let ph = self.push_param(params, val.clone());
                sql.push_str(&format!("{column} <= {ph}"));
            }
            Lookup::StartsWith(val) => {
                self.compile_like(column, format!("{}%", like_escape(val)), false, sql, params);
            }
            Lookup::IStartsWith(val) => {
                self.compile_like(column, format!("{}%", like_escape(val)), true, sql, params);
            }
            Lookup::EndsWith(val) => {
                self.compile_like(column, format!("%{}", like_escape(val)), false, sql, params);
            }
            Lookup::IEndsWith(val) => {
                self.compile_like(column, format!("%{}", like_escape(val)), true, sql, params);
            }
            Lookup::IsNull(is_null) => {
                if *is_null {
                    sql.push_str(&format!("{column} IS NULL"));
                } else {
                    sql.push_str(&format!("{column} IS NOT NULL"));
                }
            }
        }
    }
}
