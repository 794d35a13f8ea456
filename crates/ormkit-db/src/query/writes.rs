//! Write operations on a [`QuerySet`].
//!
//! Inserts strip a NULL primary key the database generates, replace related
//! objects with their keys and fill declared defaults for omitted fields.
//! UPDATE and DELETE are scoped by the filter and exclude clauses of the
//! query and refuse to run unscoped unless `each` is set.

use ormkit_core::logging::query_span;
use ormkit_core::{OrmError, OrmResult};
use tracing::Instrument;

use super::compiler::SqlCompiler;
use super::queryset::QuerySet;
use super::lookups::Lookup;
use super::statement::{
    build_mutation_scope, BulkUpdateStatement, ColumnRef, DeleteStatement, InsertStatement,
    MutationScope, UpdateStatement, WhereNode,
};
use crate::database::Database;
use crate::entity::EntityMeta;
use crate::fields::FieldDef;
use crate::model::{substitute_relations_with_keys, FieldValue, Fields, Model, Record, RelatedValue};
use crate::value::Value;

/// Drops a NULL primary key when the database can fill it in.
fn remove_null_pk(entity: &EntityMeta, fields: &mut Fields) {
    let pk = entity.pk_field();
    let is_null = fields
        .get(pk.name)
        .is_some_and(|value| value.to_value().is_null());
    if is_null && (pk.null || pk.autoincrement) {
        fields.remove(pk.name);
    }
}

/// Fills declared defaults for omitted fields, and for NULL values of
/// fields that do not accept NULL. Providers run only when needed.
fn populate_defaults(entity: &EntityMeta, values: &mut Vec<(String, Value)>) {
    for field in entity.fields.iter().filter(|f| f.has_default()) {
        match values.iter_mut().find(|(name, _)| name == field.name) {
            Some((_, slot)) if slot.is_null() && !field.null => {
                if let Some(default) = field.default_value() {
                    *slot = default;
                }
            }
            Some(_) => {}
            None => {
                if let Some(default) = field.default_value() {
                    values.push((field.name.to_string(), default));
                }
            }
        }
    }
}

/// Runs the insert preparation steps on one keyword mapping.
fn prepare_insert(entity: &EntityMeta, mut fields: Fields) -> OrmResult<Vec<(String, Value)>> {
    remove_null_pk(entity, &mut fields);
    let mut values = substitute_relations_with_keys(entity, fields)?;
    populate_defaults(entity, &mut values);
    Ok(values)
}

fn column_of<'e>(entity: &'e EntityMeta, name: &str) -> OrmResult<&'e str> {
    entity
        .field(name)
        .map(|f| f.column.as_str())
        .ok_or_else(|| {
            OrmError::QueryDefinition(format!("{} has no field named '{name}'", entity.name))
        })
}

fn unscoped(operation: &str, hint: &str) -> OrmError {
    OrmError::QueryDefinition(format!(
        "You cannot {operation} without filtering the queryset first. \
         If you want to {operation} all rows use {hint}"
    ))
}

impl<M: Model> QuerySet<M> {
    /// Inserts one object and returns it.
    ///
    /// The result carries the supplied fields, any defaults that were
    /// inserted, and the generated primary key when no key was inserted and
    /// the transport reports one of the declared key kind.
    pub async fn create(&self, db: &dyn Database, fields: impl Into<Fields>) -> OrmResult<M> {
        let entity = M::meta();
        let supplied = fields.into().normalize_pk(entity);
        let values = prepare_insert(entity, supplied.clone())?;
        let pk_name = entity.pk_name();

        let columns = values
            .iter()
            .map(|(name, value)| Ok((column_of(entity, name)?.to_string(), value.clone())))
            .collect::<OrmResult<Vec<_>>>()?;
        let generated = !values.iter().any(|(name, _)| name == pk_name);
        let stmt = InsertStatement {
            table: entity.table.clone(),
            values: columns,
            returning: generated.then(|| entity.pk_column().to_string()),
        };
        let (sql, params) = SqlCompiler::new(db.backend_type()).compile_insert(&stmt);
        tracing::debug!(entity = entity.name, params = params.len(), "{sql}");
        let outcome = db
            .execute(&sql, &params)
            .instrument(query_span(entity.name, "insert"))
            .await?;

        let mut result = Record::new(entity);
        for (name, value) in substitute_relations_with_keys(entity, supplied.clone())? {
            result.set(&name, value);
        }
        for (name, value) in supplied.iter() {
            if let FieldValue::Record(related) = value {
                result.set_related(name, RelatedValue::One(Box::new(related.clone())));
            }
        }
        for (name, value) in values {
            if result.get(&name).map_or(true, Value::is_null) && !value.is_null() {
                result.set(&name, value);
            }
        }
        if let (true, Some(key)) = (generated, outcome.generated_key.value()) {
            if key.kind() == entity.pk_kind() {
                result.set(pk_name, key.clone());
            }
        }
        M::from_record(result)
    }

    /// Inserts many objects with batched statements.
    ///
    /// Generated keys are not written back to `objects`. Rows that insert the
    /// same set of columns share one batch, so a primary key dropped from one
    /// row is never bound as NULL because another row carries it. Returns the
    /// number of inserted rows.
    pub async fn bulk_create(&self, db: &dyn Database, objects: &[M]) -> OrmResult<u64> {
        if objects.is_empty() {
            return Ok(0);
        }
        let entity = M::meta();
        let prepared = objects
            .iter()
            .map(|obj| prepare_insert(entity, obj.to_field_mapping()))
            .collect::<OrmResult<Vec<_>>>()?;

        let mut batches: Vec<(Vec<&FieldDef>, Vec<Vec<Value>>)> = Vec::new();
        for row in &prepared {
            let fields: Vec<&FieldDef> = entity
                .fields
                .iter()
                .filter(|f| row.iter().any(|(n, _)| n == f.name))
                .collect();
            let params: Vec<Value> = fields
                .iter()
                .filter_map(|f| row.iter().find(|(n, _)| n == f.name))
                .map(|(_, v)| v.clone())
                .collect();
            match batches
                .iter_mut()
                .find(|(batch, _)| batch.iter().map(|f| f.name).eq(fields.iter().map(|f| f.name)))
            {
                Some((_, param_sets)) => param_sets.push(params),
                None => batches.push((fields, vec![params])),
            }
        }

        let compiler = SqlCompiler::new(db.backend_type());
        let mut inserted = 0;
        for (fields, param_sets) in batches {
            let columns: Vec<&str> = fields.iter().map(|f| f.column.as_str()).collect();
            let sql = compiler.compile_insert_template(&entity.table, &columns);
            tracing::debug!(entity = entity.name, rows = param_sets.len(), "{sql}");
            inserted += db
                .execute_many(&sql, &param_sets)
                .instrument(query_span(entity.name, "bulk_insert"))
                .await?;
        }
        Ok(inserted)
    }

    /// Updates many persisted objects by primary key with one batched
    /// statement.
    ///
    /// `columns` defaults to every persisted field. Every object must carry a
    /// primary key; otherwise nothing is executed.
    pub async fn bulk_update(
        &self,
        db: &dyn Database,
        objects: &[M],
        columns: Option<&[&str]>,
    ) -> OrmResult<u64> {
        let entity = M::meta();
        let pk_name = entity.pk_name();
        let names: Vec<&'static str> = match columns {
            Some(columns) => columns
                .iter()
                .map(|c| {
                    entity.field(c).map(|f| f.name).ok_or_else(|| {
                        OrmError::QueryDefinition(format!(
                            "{} has no field named '{c}'",
                            entity.name
                        ))
                    })
                })
                .collect::<OrmResult<_>>()?,
            None => {
                let mut names = entity.own_field_names();
                names.extend(entity.relation_field_names());
                names
            }
        };
        let assigned: Vec<&'static str> = names.into_iter().filter(|n| *n != pk_name).collect();

        if objects.iter().any(|obj| obj.pk().is_null()) {
            return Err(OrmError::QueryDefinition(format!(
                "You cannot update unsaved objects. {} has to have {pk_name} filled.",
                entity.name
            )));
        }
        if objects.is_empty() || assigned.is_empty() {
            return Ok(0);
        }

        let mut param_sets = Vec::with_capacity(objects.len());
        for obj in objects {
            let values = substitute_relations_with_keys(entity, obj.to_field_mapping())?;
            let mut params: Vec<Value> = assigned
                .iter()
                .map(|name| {
                    values
                        .iter()
                        .find(|(n, _)| n == name)
                        .map_or(Value::Null, |(_, v)| v.clone())
                })
                .collect();
            params.push(obj.pk());
            param_sets.push(params);
        }

        let stmt = BulkUpdateStatement {
            table: entity.table.clone(),
            columns: assigned
                .iter()
                .map(|n| column_of(entity, n).map(str::to_string))
                .collect::<OrmResult<_>>()?,
            pk_column: entity.pk_column().to_string(),
        };
        let sql = SqlCompiler::new(db.backend_type()).compile_bulk_update(&stmt);
        tracing::debug!(entity = entity.name, rows = param_sets.len(), "{sql}");
        db.execute_many(&sql, &param_sets)
            .instrument(query_span(entity.name, "bulk_update"))
            .await
    }

    /// Updates every matching row and returns the affected row count.
    ///
    /// Only the entity's own fields are assigned; relation and unknown names
    /// are ignored. Without filter clauses `each` must be set.
    pub async fn update(
        &self,
        db: &dyn Database,
        each: bool,
        fields: impl Into<Fields>,
    ) -> OrmResult<u64> {
        let entity = M::meta();
        if !each && self.filter_clauses().is_empty() {
            tracing::warn!(entity = entity.name, "rejected update without filter");
            return Err(unscoped("update", "update(each=true, ..)"));
        }
        let own = entity.own_field_names();
        let assignments = fields
            .into()
            .normalize_pk(entity)
            .into_iter()
            .filter(|(name, _)| own.contains(&name.as_str()))
            .map(|(name, value)| Ok((column_of(entity, &name)?.to_string(), value.to_value())))
            .collect::<OrmResult<Vec<_>>>()?;
        if assignments.is_empty() {
            tracing::warn!(entity = entity.name, "update called without assignable fields");
            return Ok(0);
        }

        let stmt = UpdateStatement {
            table: entity.table.clone(),
            assignments,
            scope: build_mutation_scope(
                entity,
                self.select_related_paths(),
                self.filter_clauses(),
                self.exclude_clauses(),
            )?,
        };
        let (sql, params) = SqlCompiler::new(db.backend_type()).compile_update(&stmt);
        tracing::debug!(entity = entity.name, params = params.len(), "{sql}");
        let outcome = db
            .execute(&sql, &params)
            .instrument(query_span(entity.name, "update"))
            .await?;
        Ok(outcome.rows_affected)
    }

    /// Deletes every matching row and returns the affected row count.
    ///
    /// Without filter clauses `each` must be set.
    pub async fn delete(&self, db: &dyn Database, each: bool) -> OrmResult<u64> {
        let entity = M::meta();
        if !each && self.filter_clauses().is_empty() {
            tracing::warn!(entity = entity.name, "rejected delete without filter");
            return Err(unscoped("delete", "delete(each=true)"));
        }
        let stmt = DeleteStatement {
            table: entity.table.clone(),
            scope: build_mutation_scope(
                entity,
                self.select_related_paths(),
                self.filter_clauses(),
                self.exclude_clauses(),
            )?,
        };
        let (sql, params) = SqlCompiler::new(db.backend_type()).compile_delete(&stmt);
        tracing::debug!(entity = entity.name, params = params.len(), "{sql}");
        let outcome = db
            .execute(&sql, &params)
            .instrument(query_span(entity.name, "delete"))
            .await?;
        Ok(outcome.rows_affected)
    }

    /// `filter(predicates)` followed by `delete(false)`.
    pub async fn delete_by(&self, db: &dyn Database, predicates: impl Into<Fields>) -> OrmResult<u64> {
        self.filter(predicates)?.delete(db, false).await
    }

    /// Fetches the object matching `fields`, creating it when none does.
    pub async fn get_or_create(&self, db: &dyn Database, fields: impl Into<Fields>) -> OrmResult<M> {
        let fields = fields.into();
        match self.get_by(db, fields.clone()).await {
            Err(OrmError::NoMatch(_)) => self.create(db, fields).await,
            other => other,
        }
    }

    /// Updates the object whose primary key is in `fields`, or creates one
    /// when no key is given.
    pub async fn update_or_create(
        &self,
        db: &dyn Database,
        fields: impl Into<Fields>,
    ) -> OrmResult<M> {
        let entity = M::meta();
        let fields = fields.into().normalize_pk(entity);
        let pk_name = entity.pk_name();
        let pk = fields
            .get(pk_name)
            .map_or(Value::Null, FieldValue::to_value);
        if pk.is_null() {
            return self.create(db, fields).await;
        }

        let existing = self.get_by(db, [(pk_name, pk.clone())]).await?;
        let mut record = existing.to_record();
        let values = substitute_relations_with_keys(entity, fields.clone())?;
        for (name, value) in fields.iter() {
            if let FieldValue::Record(related) = value {
                record.set_related(name, RelatedValue::One(Box::new(related.clone())));
            }
        }

        let assignments = values
            .iter()
            .filter(|(name, _)| name != pk_name)
            .map(|(name, value)| Ok((column_of(entity, name)?.to_string(), value.clone())))
            .collect::<OrmResult<Vec<_>>>()?;
        for (name, value) in values {
            record.set(&name, value);
        }

        if !assignments.is_empty() {
            let stmt = UpdateStatement {
                table: entity.table.clone(),
                assignments,
                scope: MutationScope::Where(WhereNode::Condition {
                    column: ColumnRef::root(entity.pk_column()),
                    lookup: Lookup::Exact(pk),
                }),
            };
            let (sql, params) = SqlCompiler::new(db.backend_type()).compile_update(&stmt);
            tracing::debug!(entity = entity.name, params = params.len(), "{sql}");
            db.execute(&sql, &params)
                .instrument(query_span(entity.name, "update"))
                .await?;
        }
        M::from_record(record)
    }
}
