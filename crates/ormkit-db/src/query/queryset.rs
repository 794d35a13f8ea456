//! The immutable query specification.
//!
//! A [`QuerySet`] describes a read or write intent without executing it.
//! Chain methods (`filter`, `exclude`, `select_related`, `limit`, `offset`,
//! `order_by`) return a new `QuerySet` and leave the receiver untouched; the
//! clause collections are shared behind `Arc` and copied on write.
//!
//! Terminal methods take a `&dyn Database`, build the statement, compile it
//! for the transport's dialect and run it.
//!
//! # Examples
//!
//! ```ignore
//! let adults = Person::objects()
//!     .filter([("age__gte", 18_i64)])?
//!     .select_related("household")
//!     .limit(10);
//! let people = adults.all(&db).await?;
//! ```

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use ormkit_core::logging::query_span;
use ormkit_core::{OrmError, OrmResult};
use tracing::Instrument;

use super::clause::{LookupBuilder, PredicateBuilder};
use super::compiler::{DatabaseBackendType, SqlCompiler};
use super::materialize::{merge_records, record_from_row};
use super::statement::{build_select, SelectStatement, WhereNode};
use crate::database::Database;
use crate::model::{Fields, Model};
use crate::value::Value;

/// Values accepted by [`QuerySet::select_related`]: one path or several.
pub trait IntoRelationPaths {
    /// Returns the paths.
    fn into_paths(self) -> Vec<String>;
}

impl IntoRelationPaths for &str {
    fn into_paths(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoRelationPaths for String {
    fn into_paths(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoRelationPaths for &[&str] {
    fn into_paths(self) -> Vec<String> {
        self.iter().map(|p| (*p).to_string()).collect()
    }
}

impl<const N: usize> IntoRelationPaths for [&str; N] {
    fn into_paths(self) -> Vec<String> {
        self.iter().map(|p| (*p).to_string()).collect()
    }
}

impl IntoRelationPaths for Vec<&str> {
    fn into_paths(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoRelationPaths for Vec<String> {
    fn into_paths(self) -> Vec<String> {
        self
    }
}

/// Returns an unfiltered query over `M`.
pub fn query_for<M: Model>() -> QuerySet<M> {
    QuerySet {
        filter_clauses: Arc::new(Vec::new()),
        exclude_clauses: Arc::new(Vec::new()),
        select_related: Arc::new(BTreeSet::new()),
        order_by: Arc::new(Vec::new()),
        limit_count: None,
        offset: None,
        predicate_builder: Arc::new(LookupBuilder),
        _model: PhantomData,
    }
}

/// An immutable query specification for model `M`.
pub struct QuerySet<M> {
    filter_clauses: Arc<Vec<WhereNode>>,
    exclude_clauses: Arc<Vec<WhereNode>>,
    select_related: Arc<BTreeSet<String>>,
    order_by: Arc<Vec<String>>,
    limit_count: Option<u64>,
    offset: Option<u64>,
    predicate_builder: Arc<dyn PredicateBuilder>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for QuerySet<M> {
    fn clone(&self) -> Self {
        Self {
            filter_clauses: Arc::clone(&self.filter_clauses),
            exclude_clauses: Arc::clone(&self.exclude_clauses),
            select_related: Arc::clone(&self.select_related),
            order_by: Arc::clone(&self.order_by),
            limit_count: self.limit_count,
            offset: self.offset,
            predicate_builder: Arc::clone(&self.predicate_builder),
            _model: PhantomData,
        }
    }
}

impl<M> std::fmt::Debug for QuerySet<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySet")
            .field("filter_clauses", &self.filter_clauses)
            .field("exclude_clauses", &self.exclude_clauses)
            .field("select_related", &self.select_related)
            .field("order_by", &self.order_by)
            .field("limit_count", &self.limit_count)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl<M: Model> Default for QuerySet<M> {
    fn default() -> Self {
        query_for::<M>()
    }
}

impl<M: Model> QuerySet<M> {
    // ── Chaining ──────────────────────────────────────────────────────

    /// Replaces the predicate builder used by later `filter` calls.
    #[must_use]
    pub fn with_predicate_builder(&self, builder: Arc<dyn PredicateBuilder>) -> Self {
        let mut next = self.clone();
        next.predicate_builder = builder;
        next
    }

    /// Adds filter clauses built from keyword predicates.
    pub fn filter(&self, predicates: impl Into<Fields>) -> OrmResult<Self> {
        self.filter_with(predicates, false)
    }

    /// Adds exclude clauses built from keyword predicates.
    pub fn exclude(&self, predicates: impl Into<Fields>) -> OrmResult<Self> {
        self.filter_with(predicates, true)
    }

    /// Adds clauses built from keyword predicates, as exclude clauses when
    /// `negate` is set. Relation paths discovered while resolving the keys
    /// are added to `select_related`.
    pub fn filter_with(&self, predicates: impl Into<Fields>, negate: bool) -> OrmResult<Self> {
        let predicates = predicates.into();
        let (nodes, related) =
            self.predicate_builder
                .build(M::meta(), &self.select_related, &predicates)?;
        let mut next = self.clone();
        let target = if negate {
            &mut next.exclude_clauses
        } else {
            &mut next.filter_clauses
        };
        Arc::make_mut(target).extend(nodes);
        next.select_related = Arc::new(related);
        Ok(next)
    }

    /// Adds relation paths to join and embed in results.
    #[must_use]
    pub fn select_related(&self, paths: impl IntoRelationPaths) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.select_related).extend(paths.into_paths());
        next
    }

    /// Sets the maximum number of rows fetched.
    #[must_use]
    pub fn limit(&self, limit_count: u64) -> Self {
        let mut next = self.clone();
        next.limit_count = Some(limit_count);
        next
    }

    /// Sets the number of rows skipped.
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        let mut next = self.clone();
        next.offset = Some(offset);
        next
    }

    /// Replaces the ordering. A leading `-` sorts a term descending.
    #[must_use]
    pub fn order_by<S: Into<String>>(&self, terms: impl IntoIterator<Item = S>) -> Self {
        let mut next = self.clone();
        next.order_by = Arc::new(terms.into_iter().map(Into::into).collect());
        next
    }

    // ── Accessors ─────────────────────────────────────────────────────

    /// Returns the filter clauses.
    pub fn filter_clauses(&self) -> &[WhereNode] {
        &self.filter_clauses
    }

    /// Returns the exclude clauses.
    pub fn exclude_clauses(&self) -> &[WhereNode] {
        &self.exclude_clauses
    }

    /// Returns the select-related paths in sorted order.
    pub fn select_related_paths(&self) -> &BTreeSet<String> {
        &self.select_related
    }

    /// Returns the ordering terms.
    pub fn order_terms(&self) -> &[String] {
        &self.order_by
    }

    /// Returns the row limit.
    pub const fn limit_count(&self) -> Option<u64> {
        self.limit_count
    }

    /// Returns the row offset.
    pub const fn offset_count(&self) -> Option<u64> {
        self.offset
    }

    // ── Statement construction ────────────────────────────────────────

    /// Builds the SELECT for this specification.
    pub fn build_select_expression(&self) -> OrmResult<SelectStatement> {
        build_select(
            M::meta(),
            &self.select_related,
            &self.filter_clauses,
            &self.exclude_clauses,
            &self.order_by,
            self.limit_count,
            self.offset,
        )
    }

    /// Compiles the SELECT for a backend.
    pub fn to_sql(&self, backend: DatabaseBackendType) -> OrmResult<(String, Vec<Value>)> {
        Ok(SqlCompiler::new(backend).compile_select(&self.build_select_expression()?))
    }

    /// Compiles the row count query for a backend.
    pub fn count_sql(&self, backend: DatabaseBackendType) -> OrmResult<(String, Vec<Value>)> {
        Ok(SqlCompiler::new(backend).compile_count(&self.build_select_expression()?))
    }

    /// Compiles the existence query for a backend.
    pub fn exists_sql(&self, backend: DatabaseBackendType) -> OrmResult<(String, Vec<Value>)> {
        Ok(SqlCompiler::new(backend).compile_exists(&self.build_select_expression()?))
    }

    // ── Reads ─────────────────────────────────────────────────────────

    async fn fetch(&self, db: &dyn Database, stmt: &SelectStatement) -> OrmResult<Vec<M>> {
        let (sql, params) = SqlCompiler::new(db.backend_type()).compile_select(stmt);
        tracing::debug!(entity = M::meta().name, params = params.len(), "{sql}");
        let rows = db
            .fetch_all(&sql, &params)
            .instrument(query_span(M::meta().name, "select"))
            .await?;
        let records = rows
            .iter()
            .map(|row| record_from_row(M::meta(), row, &self.select_related))
            .collect::<OrmResult<Vec<_>>>()?;
        merge_records(records)
            .into_iter()
            .map(M::from_record)
            .collect()
    }

    fn single(mut rows: Vec<M>) -> OrmResult<M> {
        match rows.len() {
            0 => Err(OrmError::NoMatch(format!(
                "{} matching query does not exist",
                M::meta().name
            ))),
            1 => Ok(rows.remove(0)),
            n => Err(OrmError::MultipleMatches(format!(
                "expected one {}, found {n}",
                M::meta().name
            ))),
        }
    }

    /// Fetches every matching object, one per primary key.
    pub async fn all(&self, db: &dyn Database) -> OrmResult<Vec<M>> {
        let stmt = self.build_select_expression()?;
        self.fetch(db, &stmt).await
    }

    /// `filter(predicates)` followed by [`all`](Self::all).
    pub async fn all_by(&self, db: &dyn Database, predicates: impl Into<Fields>) -> OrmResult<Vec<M>> {
        self.filter(predicates)?.all(db).await
    }

    /// Fetches the first matching object.
    ///
    /// Fails with `NoMatch` when nothing matches.
    pub async fn first(&self, db: &dyn Database) -> OrmResult<M> {
        let rows = self.limit(1).all(db).await?;
        Self::single(rows)
    }

    /// `filter(predicates)` followed by [`first`](Self::first).
    pub async fn first_by(&self, db: &dyn Database, predicates: impl Into<Fields>) -> OrmResult<M> {
        self.filter(predicates)?.first(db).await
    }

    /// Fetches exactly one matching object.
    ///
    /// Without filter clauses at most two rows are fetched. Fails with
    /// `NoMatch` when nothing matches and `MultipleMatches` when more than
    /// one object does.
    ///
    /// The two-row cap applies to joined rows. With a one-to-many
    /// `select_related` and no filter, the returned object holds at most
    /// two related children even when more exist; filter first to load
    /// the full collection.
    pub async fn get(&self, db: &dyn Database) -> OrmResult<M> {
        let mut stmt = self.build_select_expression()?;
        if self.filter_clauses.is_empty() {
            stmt.limit = Some(2);
        }
        let rows = self.fetch(db, &stmt).await?;
        Self::single(rows)
    }

    /// `filter(predicates)` followed by [`get`](Self::get).
    pub async fn get_by(&self, db: &dyn Database, predicates: impl Into<Fields>) -> OrmResult<M> {
        self.filter(predicates)?.get(db).await
    }

    /// Returns `true` if any row matches.
    pub async fn exists(&self, db: &dyn Database) -> OrmResult<bool> {
        let (sql, params) = self.exists_sql(db.backend_type())?;
        tracing::debug!(entity = M::meta().name, params = params.len(), "{sql}");
        let value = db
            .fetch_value(&sql, &params)
            .instrument(query_span(M::meta().name, "exists"))
            .await?;
        super::compiler::FromValue::from_value(&value)
    }

    /// Counts matching rows before merging, so join fan-out is included.
    pub async fn count(&self, db: &dyn Database) -> OrmResult<u64> {
        let (sql, params) = self.count_sql(db.backend_type())?;
        tracing::debug!(entity = M::meta().name, params = params.len(), "{sql}");
        let value = db
            .fetch_value(&sql, &params)
            .instrument(query_span(M::meta().name, "count"))
            .await?;
        super::compiler::FromValue::from_value(&value)
    }
}
