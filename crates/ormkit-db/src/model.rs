//! Domain objects.
//!
//! [`Record`] is the untyped form of one entity instance: its scalar values
//! in field order plus any related objects embedded through
//! `select_related`. Typed structs implement [`Model`] by converting from
//! and to a `Record`; every materialization and write path goes through that
//! pair.
//!
//! [`Fields`] is the keyword-style argument list accepted by filters and
//! write operations. Its values may be scalars or whole related objects,
//! which [`substitute_relations_with_keys`] replaces with their primary key.

use std::collections::BTreeSet;
use std::fmt;

use ormkit_core::{OrmError, OrmResult};

use crate::entity::EntityMeta;
use crate::query::compiler::{FromValue, Row};
use crate::query::materialize;
use crate::query::queryset::{query_for, QuerySet};
use crate::value::Value;

/// A related object embedded in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedValue {
    /// A many-to-one relation.
    One(Box<Record>),
    /// A one-to-many relation, in first-encounter order.
    Many(Vec<Record>),
}

/// One entity instance in untyped form.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use ormkit_db::entity::EntityMeta;
/// use ormkit_db::fields::{FieldDef, FieldType};
/// use ormkit_db::model::Record;
/// use ormkit_db::value::Value;
///
/// static META: LazyLock<EntityMeta> = LazyLock::new(|| {
///     EntityMeta::builder("Tag")
///         .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
///         .field(FieldDef::new("label", FieldType::CharField))
///         .build()
///         .unwrap()
/// });
///
/// let tag = Record::new(&META).with("pk", 3_i64).with("label", "rust");
/// assert_eq!(tag.pk(), Value::Int(3));
/// assert_eq!(tag.get_as::<String>("label").unwrap(), "rust");
/// ```
#[derive(Clone)]
pub struct Record {
    entity: &'static EntityMeta,
    values: Vec<(String, Value)>,
    related: Vec<(String, RelatedValue)>,
}

impl Record {
    /// Creates an empty record of `entity`.
    pub fn new(entity: &'static EntityMeta) -> Self {
        Self {
            entity,
            values: Vec::new(),
            related: Vec::new(),
        }
    }

    /// Returns the entity this record belongs to.
    pub fn entity(&self) -> &'static EntityMeta {
        self.entity
    }

    /// Returns the value stored under `name`. Accepts the `pk` alias.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = self.entity.resolve_name(name);
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Returns the value stored under `name`, or NULL.
    pub fn value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }

    /// Converts the value stored under `name`. A missing value reads as NULL.
    pub fn get_as<T: FromValue>(&self, name: &str) -> OrmResult<T> {
        T::from_value(self.get(name).unwrap_or(&Value::Null))
    }

    /// Stores a value, replacing any previous one.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let name = self.entity.resolve_name(name);
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Returns the primary key value, or NULL when unset.
    pub fn pk(&self) -> Value {
        self.value(self.entity.pk_name())
    }

    /// Returns the stored values in insertion order.
    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    /// Returns the related object stored under `name`.
    pub fn related(&self, name: &str) -> Option<&RelatedValue> {
        self.related.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Returns the related object of a many-to-one relation, if loaded.
    pub fn related_one(&self, name: &str) -> Option<&Self> {
        match self.related(name) {
            Some(RelatedValue::One(record)) => Some(record),
            _ => None,
        }
    }

    /// Returns the loaded objects of a one-to-many relation. Empty when the
    /// relation was not loaded.
    pub fn related_many(&self, name: &str) -> &[Self] {
        match self.related(name) {
            Some(RelatedValue::Many(records)) => records,
            _ => &[],
        }
    }

    /// Stores a related object, replacing any previous one.
    pub fn set_related(&mut self, name: &str, related: RelatedValue) {
        match self.related.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = related,
            None => self.related.push((name.to_string(), related)),
        }
    }

    pub(crate) fn related_mut(&mut self, name: &str) -> Option<&mut RelatedValue> {
        self.related
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }

    pub(crate) fn take_related(&mut self) -> Vec<(String, RelatedValue)> {
        std::mem::take(&mut self.related)
    }

    /// Returns the persisted fields of this record as a keyword mapping. A
    /// foreign key with a loaded related object maps to that object.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        for (name, value) in &self.values {
            match self.related_one(name) {
                Some(related) if self.entity.field(name).is_some_and(|f| f.is_relation()) => {
                    fields.insert(name.clone(), FieldValue::Record(related.clone()));
                }
                _ => fields.insert(name.clone(), FieldValue::Value(value.clone())),
            }
        }
        fields
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.entity, other.entity)
            && self.values == other.values
            && self.related == other.related
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.entity.name)
            .field("values", &self.values)
            .field("related", &self.related)
            .finish()
    }
}

/// A keyword argument value: a scalar, or a related object standing in for
/// its primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// A scalar value.
    Value(Value),
    /// A related object.
    Record(Record),
}

impl FieldValue {
    /// Returns the scalar, or the related object's primary key.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Record(r) => r.pk(),
        }
    }
}

macro_rules! impl_field_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::Value(v.into())
                }
            }
        )*
    };
}

impl_field_value_from! {
    Value,
    bool,
    i32,
    i64,
    f64,
    String,
    &str,
    uuid::Uuid,
    chrono::NaiveDate,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::Utc>,
    serde_json::Value,
}

impl<T: Into<Value>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        Self::Value(v.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        Self::Value(v.into())
    }
}

impl From<Record> for FieldValue {
    fn from(r: Record) -> Self {
        Self::Record(r)
    }
}

impl<M: Model> From<&M> for FieldValue {
    fn from(m: &M) -> Self {
        Self::Record(m.to_record())
    }
}

/// An ordered keyword mapping of field names (or lookup keys) to values.
///
/// # Examples
///
/// ```
/// use ormkit_db::model::Fields;
///
/// let fields = Fields::new().set("name", "Ann").set("age__gte", 30_i64);
/// assert_eq!(fields.len(), 2);
/// assert!(fields.contains("age__gte"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder form of [`insert`](Self::insert).
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Stores a value, replacing an existing entry of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    /// Returns the value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Removes and returns the value stored under `name`.
    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let idx = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(idx).1)
    }

    /// Returns `true` if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Renames a `pk` entry to the entity's primary key field name.
    #[must_use]
    pub fn normalize_pk(mut self, entity: &EntityMeta) -> Self {
        if let Some(value) = self.remove("pk") {
            self.insert(entity.pk_name(), value);
        }
        self
    }
}

impl<K: Into<String>, V: Into<FieldValue>, const N: usize> From<[(K, V); N]> for Fields {
    fn from(entries: [(K, V); N]) -> Self {
        entries
            .into_iter()
            .fold(Self::new(), |fields, (k, v)| fields.set(k, v))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> From<Vec<(K, V)>> for Fields {
    fn from(entries: Vec<(K, V)>) -> Self {
        entries
            .into_iter()
            .fold(Self::new(), |fields, (k, v)| fields.set(k, v))
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Converts a keyword mapping of persisted fields into column-ready values.
///
/// `pk` is renamed to the key field, related objects are replaced by their
/// primary key, and foreign key scalars are converted to the kind of the
/// target's key. Names that are not persisted fields are rejected.
pub fn substitute_relations_with_keys(
    entity: &EntityMeta,
    fields: Fields,
) -> OrmResult<Vec<(String, Value)>> {
    let mut out: Vec<(String, Value)> = Vec::with_capacity(fields.len());
    for (name, value) in fields.normalize_pk(entity) {
        let field = entity.field(&name).ok_or_else(|| {
            OrmError::QueryDefinition(format!("{} has no field named '{name}'", entity.name))
        })?;
        let value = match (field.target(), value) {
            (Some(target), FieldValue::Record(record)) => {
                if !std::ptr::eq(record.entity(), target) {
                    return Err(OrmError::Relationship(format!(
                        "{}.{name} expects a {} object, got {}",
                        entity.name,
                        target.name,
                        record.entity().name
                    )));
                }
                record.pk()
            }
            (Some(target), FieldValue::Value(value)) => {
                let value = value.coerce(target.pk_kind());
                if !value.is_null() && value.kind() != target.pk_kind() {
                    return Err(OrmError::Relationship(format!(
                        "{}.{name} expects a {:?} key of {}, got {value}",
                        entity.name,
                        target.pk_kind(),
                        target.name
                    )));
                }
                value
            }
            (None, FieldValue::Record(record)) => {
                return Err(OrmError::Relationship(format!(
                    "{}.{name} is not a relation but received a {} object",
                    entity.name,
                    record.entity().name
                )))
            }
            (None, FieldValue::Value(value)) => value,
        };
        out.push((field.name.to_string(), value));
    }
    Ok(out)
}

/// The core trait for typed domain objects.
///
/// Implementors describe their entity through [`meta`](Model::meta) and
/// convert from and to a [`Record`]; everything else has a default.
///
/// # Examples
///
/// ```
/// use std::sync::LazyLock;
/// use ormkit_core::OrmResult;
/// use ormkit_db::entity::EntityMeta;
/// use ormkit_db::fields::{FieldDef, FieldType};
/// use ormkit_db::model::{Model, Record};
///
/// struct Tag {
///     id: Option<i64>,
///     label: String,
/// }
///
/// impl Model for Tag {
///     fn meta() -> &'static EntityMeta {
///         static META: LazyLock<EntityMeta> = LazyLock::new(|| {
///             EntityMeta::builder("Tag")
///                 .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
///                 .field(FieldDef::new("label", FieldType::CharField))
///                 .build()
///                 .unwrap()
///         });
///         &META
///     }
///
///     fn from_record(record: Record) -> OrmResult<Self> {
///         Ok(Self {
///             id: record.get_as("id")?,
///             label: record.get_as("label")?,
///         })
///     }
///
///     fn to_record(&self) -> Record {
///         Record::new(Self::meta())
///             .with("id", self.id)
///             .with("label", self.label.as_str())
///     }
/// }
///
/// let tag = Tag { id: None, label: "rust".into() };
/// assert!(tag.pk().is_null());
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// Returns the static metadata for this model type.
    fn meta() -> &'static EntityMeta;

    /// Builds an instance from its untyped form.
    fn from_record(record: Record) -> OrmResult<Self>;

    /// Returns the untyped form of this instance.
    fn to_record(&self) -> Record;

    /// Returns the primary key value, or NULL when unsaved.
    fn pk(&self) -> Value {
        self.to_record().pk()
    }

    /// Sets the primary key value on this instance.
    fn set_pk(&mut self, value: Value) -> OrmResult<()> {
        let mut record = self.to_record();
        record.set(Self::meta().pk_name(), value);
        *self = Self::from_record(record)?;
        Ok(())
    }

    /// Returns an unfiltered query over this model.
    fn objects() -> QuerySet<Self> {
        query_for::<Self>()
    }

    /// Materializes one result row, embedding the requested relations.
    fn from_row(row: &Row, select_related: &BTreeSet<String>) -> OrmResult<Self> {
        Self::from_record(materialize::record_from_row(Self::meta(), row, select_related)?)
    }

    /// Collapses instances sharing a primary key, merging their related
    /// collections.
    fn merge_instances(instances: Vec<Self>) -> OrmResult<Vec<Self>> {
        let records = instances.iter().map(Self::to_record).collect();
        materialize::merge_records(records)
            .into_iter()
            .map(Self::from_record)
            .collect()
    }

    /// Returns the persisted fields of this instance as a keyword mapping.
    fn to_field_mapping(&self) -> Fields {
        self.to_record().to_fields()
    }

    /// Replaces related objects in `mapping` with their primary keys.
    fn substitute_relations_with_keys(mapping: Fields) -> OrmResult<Vec<(String, Value)>> {
        substitute_relations_with_keys(Self::meta(), mapping)
    }
}

/// A typed many-to-one field: the key alone, or the loaded related object.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignKey<T> {
    /// Only the related primary key is known.
    Key(Value),
    /// The related object was loaded through `select_related`.
    Loaded(Box<T>),
}

impl<T: Model> ForeignKey<T> {
    /// Returns the related primary key.
    pub fn key(&self) -> Value {
        match self {
            Self::Key(key) => key.clone(),
            Self::Loaded(obj) => obj.pk(),
        }
    }

    /// Returns the related object, if loaded.
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Key(_) => None,
            Self::Loaded(obj) => Some(obj),
        }
    }

    /// Reads the field `name` of `record`, preferring a loaded related object.
    pub fn read(record: &Record, name: &str) -> OrmResult<Self> {
        match record.related_one(name) {
            Some(related) => Ok(Self::Loaded(Box::new(T::from_record(related.clone())?))),
            None => Ok(Self::Key(record.value(name))),
        }
    }

    /// Writes this field into `record` under `name`.
    pub fn write(&self, record: &mut Record, name: &str) {
        record.set(name, self.key());
        if let Self::Loaded(obj) = self {
            record.set_related(name, RelatedValue::One(Box::new(obj.to_record())));
        }
    }
}

impl<T> From<Value> for ForeignKey<T> {
    fn from(key: Value) -> Self {
        Self::Key(key)
    }
}
