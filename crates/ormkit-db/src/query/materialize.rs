//! Row materialization and merging.
//!
//! A joined SELECT returns one row per combination of root and related
//! rows. [`record_from_row`] turns one such row into a [`Record`] with its
//! related objects nested by relation path, and [`merge_records`] collapses
//! the fan-out of one-to-many joins back into one record per root key.

use std::collections::{BTreeSet, HashMap};

use ormkit_core::{OrmError, OrmResult};

use super::compiler::Row;
use super::statement::{expand_paths, resolve_path};
use crate::entity::EntityMeta;
use crate::model::{Record, RelatedValue};
use crate::value::{Value, ValueKind};

/// Builds a record of `entity` from one result row.
///
/// Root columns are read by column name, columns of a joined path `p` by
/// `p__<column>`. A related object whose primary key column is NULL is left
/// out; a one-to-many relation without a row starts as an empty collection.
pub fn record_from_row(
    entity: &'static EntityMeta,
    row: &Row,
    select_related: &BTreeSet<String>,
) -> OrmResult<Record> {
    let paths = expand_paths(select_related);
    for path in &paths {
        resolve_path(entity, path)?;
    }
    let mut record = read_columns(entity, row, None)?;
    populate_related(&mut record, row, None, &paths)?;
    Ok(record)
}

fn label(prefix: Option<&str>, column: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}__{column}"),
        None => column.to_string(),
    }
}

fn read_columns(
    entity: &'static EntityMeta,
    row: &Row,
    prefix: Option<&str>,
) -> OrmResult<Record> {
    let mut record = Record::new(entity);
    for field in &entity.fields {
        let label = label(prefix, &field.column);
        let value = row.get_value(&label).ok_or_else(|| {
            OrmError::DatabaseError(format!(
                "Column '{label}' for {}.{} not found in row",
                entity.name, field.name
            ))
        })?;
        record.set(field.name, value.clone().coerce(field.value_kind()));
    }
    Ok(record)
}

fn populate_related(
    record: &mut Record,
    row: &Row,
    prefix: Option<&str>,
    paths: &BTreeSet<String>,
) -> OrmResult<()> {
    let entity = record.entity();
    for relation in &entity.relations {
        let path = label(prefix, &relation.name);
        if !paths.contains(&path) {
            continue;
        }
        let target = relation.target();
        let pk_label = label(Some(&path), target.pk_column());
        if row.get_value(&pk_label).map_or(true, Value::is_null) {
            if relation.is_many() {
                record.set_related(&relation.name, RelatedValue::Many(Vec::new()));
            }
            continue;
        }
        let mut child = read_columns(target, row, Some(&path))?;
        populate_related(&mut child, row, Some(&path), paths)?;
        let related = if relation.is_many() {
            RelatedValue::Many(vec![child])
        } else {
            RelatedValue::One(Box::new(child))
        };
        record.set_related(&relation.name, related);
    }
    Ok(())
}

/// Identity of a record for merging: the key's kind and rendered value.
fn identity(record: &Record) -> (ValueKind, String) {
    let pk = record.pk();
    (pk.kind(), pk.to_string())
}

/// Collapses records sharing a primary key, keeping the first occurrence
/// and first-appearance order.
///
/// Related collections of a repeated record are appended to the first
/// occurrence, skipping objects already present by their own key. Objects
/// already present are merged recursively by the same rule.
pub fn merge_records(records: Vec<Record>) -> Vec<Record> {
    let total = records.len();
    let mut merged: Vec<Record> = Vec::with_capacity(total);
    let mut index: HashMap<(ValueKind, String), usize> = HashMap::with_capacity(total);
    for record in records {
        let key = identity(&record);
        match index.get(&key).copied() {
            Some(pos) => merge_into(&mut merged[pos], record),
            None => {
                index.insert(key, merged.len());
                merged.push(record);
            }
        }
    }
    tracing::trace!(rows = total, unique = merged.len(), "merged result rows");
    merged
}

fn merge_into(target: &mut Record, mut source: Record) {
    for (name, incoming) in source.take_related() {
        if target.related(&name).is_none() {
            target.set_related(&name, incoming);
            continue;
        }
        let Some(current) = target.related_mut(&name) else {
            continue;
        };
        match (current, incoming) {
            (RelatedValue::Many(existing), RelatedValue::Many(items)) => {
                for item in items {
                    let key = identity(&item);
                    match existing.iter_mut().find(|e| identity(e) == key) {
                        Some(present) => merge_into(present, item),
                        None => existing.push(item),
                    }
                }
            }
            (RelatedValue::One(existing), RelatedValue::One(item)) => {
                if identity(existing) == identity(&item) {
                    merge_into(existing, *item);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldDef, FieldType};
    use std::sync::LazyLock;

    fn customer_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("Customer")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField))
                .field(FieldDef::new("vip", FieldType::BooleanField))
                .has_many(order_meta, "customer")
                .build()
                .unwrap()
        });
        &META
    }

    fn order_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("Order")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("total", FieldType::FloatField))
                .field(FieldDef::foreign_key("customer", customer_meta))
                .build()
                .unwrap()
        });
        &META
    }

    fn paths(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn fan_out_row(customer: i64, order: Option<i64>) -> Row {
        Row::from_pairs([
            ("id", Value::Int(customer)),
            ("name", Value::from(format!("c{customer}"))),
            ("vip", Value::Int(0)),
            ("orders__id", order.into()),
            ("orders__total", order.map(|o| o as f64).into()),
            ("orders__customer", order.map(|_| customer).into()),
        ])
    }

    #[test]
    fn test_root_columns_are_coerced() {
        let row = fan_out_row(1, None);
        let record = record_from_row(customer_meta(), &row, &BTreeSet::new()).unwrap();
        assert_eq!(record.value("vip"), Value::Bool(false));
        assert!(record.related("orders").is_none());
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let row = Row::from_pairs([("id", Value::Int(1))]);
        assert!(record_from_row(customer_meta(), &row, &BTreeSet::new()).is_err());
    }

    #[test]
    fn test_null_many_relation_is_empty() {
        let row = fan_out_row(1, None);
        let record = record_from_row(customer_meta(), &row, &paths(&["orders"])).unwrap();
        assert_eq!(record.related("orders"), Some(&RelatedValue::Many(vec![])));
    }

    #[test]
    fn test_null_one_relation_is_absent() {
        let row = Row::from_pairs([
            ("id", Value::Int(5)),
            ("total", Value::Float(1.0)),
            ("customer", Value::Int(9)),
            ("customer__id", Value::Null),
            ("customer__name", Value::Null),
            ("customer__vip", Value::Null),
        ]);
        let record = record_from_row(order_meta(), &row, &paths(&["customer"])).unwrap();
        assert!(record.related_one("customer").is_none());
        assert_eq!(record.value("customer"), Value::Int(9));
    }

    #[test]
    fn test_unknown_path_is_rejected() {
        let row = fan_out_row(1, None);
        let err = record_from_row(customer_meta(), &row, &paths(&["invoices"])).unwrap_err();
        assert!(matches!(err, OrmError::QueryDefinition(_)));
    }

    #[test]
    fn test_merge_fan_out() {
        let rows = [
            fan_out_row(1, Some(10)),
            fan_out_row(1, Some(11)),
            fan_out_row(2, Some(12)),
        ];
        let records = rows
            .iter()
            .map(|r| record_from_row(customer_meta(), r, &paths(&["orders"])).unwrap())
            .collect();
        let merged = merge_records(records);
        assert_eq!(merged.len(), 2);
        let first: Vec<_> = merged[0].related_many("orders").iter().map(Record::pk).collect();
        assert_eq!(first, vec![Value::Int(10), Value::Int(11)]);
        let second: Vec<_> = merged[1].related_many("orders").iter().map(Record::pk).collect();
        assert_eq!(second, vec![Value::Int(12)]);
    }

    #[test]
    fn test_merge_skips_duplicate_children() {
        let rows = [fan_out_row(1, Some(10)), fan_out_row(1, Some(10))];
        let records = rows
            .iter()
            .map(|r| record_from_row(customer_meta(), r, &paths(&["orders"])).unwrap())
            .collect();
        let merged = merge_records(records);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].related_many("orders").len(), 1);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_records(Vec::new()).is_empty());
    }

    #[test]
    fn test_merge_nested_collections() {
        let order = |id: i64| Record::new(order_meta()).with("id", id);
        let customer_with = |orders: Vec<Record>| {
            let mut c = Record::new(customer_meta()).with("id", 1_i64);
            c.set_related("orders", RelatedValue::Many(orders));
            c
        };
        let mut outer_a = Record::new(order_meta()).with("id", 100_i64);
        outer_a.set_related(
            "customer",
            RelatedValue::One(Box::new(customer_with(vec![order(1)]))),
        );
        let mut outer_b = Record::new(order_meta()).with("id", 100_i64);
        outer_b.set_related(
            "customer",
            RelatedValue::One(Box::new(customer_with(vec![order(2)]))),
        );

        let merged = merge_records(vec![outer_a, outer_b]);
        assert_eq!(merged.len(), 1);
        let customer = merged[0].related_one("customer").unwrap();
        assert_eq!(customer.related_many("orders").len(), 2);
    }
}
