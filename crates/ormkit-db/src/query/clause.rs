//! Predicate construction from keyword lookups.
//!
//! A [`QuerySet`](super::QuerySet) hands the keyword arguments of every
//! `filter`/`exclude` call to a [`PredicateBuilder`]. The default
//! [`LookupBuilder`] understands `field`, `field__op` and
//! `relation__...__field__op` keys. Walking a relation adds its path to the
//! select-related set so the statement builder joins it.

use std::collections::BTreeSet;
use std::fmt;

use ormkit_core::{OrmError, OrmResult};

use super::lookups::{is_operator, Lookup};
use super::statement::{ColumnRef, WhereNode};
use crate::entity::EntityMeta;
use crate::model::{FieldValue, Fields};

/// Turns keyword predicates into WHERE nodes.
///
/// Implementations must be deterministic and must not modify their inputs:
/// the returned select-related set is a new set containing the existing
/// paths plus any discovered while resolving the keys.
pub trait PredicateBuilder: Send + Sync + fmt::Debug {
    /// Builds the nodes for one `filter` or `exclude` call.
    fn build(
        &self,
        entity: &'static EntityMeta,
        select_related: &BTreeSet<String>,
        predicates: &Fields,
    ) -> OrmResult<(Vec<WhereNode>, BTreeSet<String>)>;
}

/// The default predicate builder for double-underscore lookup keys.
///
/// All predicates of one call are combined into a single AND node.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupBuilder;

impl LookupBuilder {
    fn condition(
        entity: &'static EntityMeta,
        key: &str,
        value: &FieldValue,
        related: &mut BTreeSet<String>,
    ) -> OrmResult<WhereNode> {
        let segments: Vec<&str> = key.split("__").collect();
        let mut current = entity;
        let mut path: Vec<&str> = Vec::new();
        let mut i = 0;

        while i + 1 < segments.len() && !is_operator(segments[i + 1]) {
            let Some(relation) = current.relation(segments[i]) else {
                break;
            };
            path.push(segments[i]);
            current = relation.target();
            i += 1;
        }

        let rest = &segments[i..];
        let (name, operator) = match rest {
            [name] => (*name, "exact"),
            [name, op] if is_operator(op) => (*name, *op),
            _ => {
                return Err(OrmError::QueryDefinition(format!(
                    "Cannot resolve lookup '{key}' on {}",
                    entity.name
                )))
            }
        };

        let field = current.field(name).ok_or_else(|| {
            let reason = if current.relation(name).is_some() {
                "is a reverse relation and needs a field after it"
            } else {
                "is not a field"
            };
            OrmError::QueryDefinition(format!(
                "Cannot resolve lookup '{key}': '{name}' {reason} of {}",
                current.name
            ))
        })?;

        let value = match value {
            FieldValue::Value(v) => v.clone(),
            FieldValue::Record(record) => match field.target() {
                Some(target) if std::ptr::eq(record.entity(), target) => record.pk(),
                Some(target) => {
                    return Err(OrmError::Relationship(format!(
                        "Lookup '{key}' expects a {} object, got {}",
                        target.name,
                        record.entity().name
                    )))
                }
                None if std::ptr::eq(record.entity(), current) && field.primary_key => {
                    record.pk()
                }
                None => {
                    return Err(OrmError::Relationship(format!(
                        "Lookup '{key}' compares a plain field with a {} object",
                        record.entity().name
                    )))
                }
            },
        };

        let column = if path.is_empty() {
            ColumnRef::root(field.column.clone())
        } else {
            let path = path.join("__");
            related.insert(path.clone());
            ColumnRef::joined(path, field.column.clone())
        };

        Ok(WhereNode::Condition {
            column,
            lookup: Lookup::from_operator(operator, value)?,
        })
    }
}

impl PredicateBuilder for LookupBuilder {
    fn build(
        &self,
        entity: &'static EntityMeta,
        select_related: &BTreeSet<String>,
        predicates: &Fields,
    ) -> OrmResult<(Vec<WhereNode>, BTreeSet<String>)> {
        let mut related = select_related.clone();
        let mut conditions = predicates
            .iter()
            .map(|(key, value)| Self::condition(entity, key, value, &mut related))
            .collect::<OrmResult<Vec<_>>>()?;
        let nodes = match conditions.len() {
            0 => Vec::new(),
            1 => conditions.split_off(0),
            _ => vec![WhereNode::And(conditions)],
        };
        Ok((nodes, related))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldDef, FieldType};
    use crate::model::Record;
    use crate::value::Value;
    use std::sync::LazyLock;

    fn country_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("Country")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField))
                .build()
                .unwrap()
        });
        &META
    }

    fn city_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("City")
                .table("cities")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField))
                .field(FieldDef::new("population", FieldType::BigIntegerField))
                .field(FieldDef::foreign_key("country", country_meta).column("country_id"))
                .build()
                .unwrap()
        });
        &META
    }

    fn build(fields: Fields) -> OrmResult<(Vec<WhereNode>, BTreeSet<String>)> {
        LookupBuilder.build(city_meta(), &BTreeSet::new(), &fields)
    }

    #[test]
    fn test_plain_field_defaults_to_exact() {
        let (nodes, related) = build(Fields::new().set("name", "Oslo")).unwrap();
        assert_eq!(
            nodes,
            vec![WhereNode::Condition {
                column: ColumnRef::root("name"),
                lookup: Lookup::Exact(Value::from("Oslo")),
            }]
        );
        assert!(related.is_empty());
    }

    #[test]
    fn test_operator_suffix() {
        let (nodes, _) = build(Fields::new().set("population__gte", 1000_i64)).unwrap();
        assert!(matches!(
            &nodes[0],
            WhereNode::Condition { lookup: Lookup::Gte(Value::Int(1000)), .. }
        ));
    }

    #[test]
    fn test_multiple_predicates_form_one_and_node() {
        let (nodes, _) =
            build(Fields::new().set("name", "Oslo").set("population__lt", 5_i64)).unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(matches!(&nodes[0], WhereNode::And(children) if children.len() == 2));
    }

    #[test]
    fn test_relation_walk_adds_select_related() {
        let (nodes, related) = build(Fields::new().set("country__name__iexact", "norway")).unwrap();
        assert_eq!(
            nodes,
            vec![WhereNode::Condition {
                column: ColumnRef::joined("country", "name"),
                lookup: Lookup::IExact(Value::from("norway")),
            }]
        );
        assert!(related.contains("country"));
    }

    #[test]
    fn test_bare_relation_compares_fk_column() {
        let (nodes, related) = build(Fields::new().set("country__in", vec![1_i64, 2])).unwrap();
        assert_eq!(
            nodes,
            vec![WhereNode::Condition {
                column: ColumnRef::root("country_id"),
                lookup: Lookup::In(vec![Value::Int(1), Value::Int(2)]),
            }]
        );
        assert!(related.is_empty());
    }

    #[test]
    fn test_related_object_becomes_its_key() {
        let norway = Record::new(country_meta()).with("id", 47_i64);
        let (nodes, _) = build(Fields::new().set("country", norway)).unwrap();
        assert!(matches!(
            &nodes[0],
            WhereNode::Condition { lookup: Lookup::Exact(Value::Int(47)), .. }
        ));
    }

    #[test]
    fn test_wrong_related_object() {
        let city = Record::new(city_meta()).with("id", 1_i64);
        let err = build(Fields::new().set("country", city)).unwrap_err();
        assert!(matches!(err, OrmError::Relationship(_)));
    }

    #[test]
    fn test_pk_alias() {
        let (nodes, _) = build(Fields::new().set("pk", 3_i64)).unwrap();
        assert!(matches!(
            &nodes[0],
            WhereNode::Condition { column, .. } if column.column == "id"
        ));
    }

    #[test]
    fn test_unknown_keys() {
        for key in ["mayor", "name__regex", "country__capital", "name__exact__x"] {
            let err = build(Fields::new().set(key, "x")).unwrap_err();
            assert!(matches!(err, OrmError::QueryDefinition(_)), "{key}");
        }
    }

    #[test]
    fn test_inputs_are_untouched() {
        let existing: BTreeSet<String> = ["country".to_string()].into_iter().collect();
        let fields = Fields::new().set("country__name", "Peru");
        let (_, related) = LookupBuilder
            .build(city_meta(), &existing, &fields)
            .unwrap();
        assert_eq!(existing.len(), 1);
        assert_eq!(related.len(), 1);
        assert_eq!(fields.len(), 1);
    }
}
