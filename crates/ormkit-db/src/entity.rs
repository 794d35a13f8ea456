//! Entity metadata.
//!
//! [`EntityMeta`] is the read-only description of one table: its persisted
//! fields, which of them is the primary key, and the relations that can be
//! joined through `select_related`. Metadata is built once, usually inside a
//! `LazyLock`, and handed out as `&'static EntityMeta`.

use ormkit_core::{OrmError, OrmResult};

use crate::fields::FieldDef;
use crate::value::ValueKind;

/// The direction of a relation as seen from the entity that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This entity holds a foreign key to the target.
    ManyToOne,
    /// The target holds a foreign key back to this entity.
    OneToMany,
}

/// A relation that can be joined and embedded in results.
#[derive(Debug, Clone)]
pub struct RelationDef {
    /// The relation name used in lookups and `select_related` paths.
    pub name: String,
    /// The relation direction.
    pub kind: RelationKind,
    /// The related entity.
    pub target: fn() -> &'static EntityMeta,
    /// The foreign key field: on this entity for many-to-one, on the target
    /// for one-to-many.
    pub via: &'static str,
}

impl RelationDef {
    /// Returns the related entity.
    pub fn target(&self) -> &'static EntityMeta {
        (self.target)()
    }

    /// Returns `true` if the relation embeds a collection.
    pub fn is_many(&self) -> bool {
        self.kind == RelationKind::OneToMany
    }

    /// Returns the `(owner column, target column)` pair joined by this relation.
    pub fn join_columns(&self, owner: &EntityMeta) -> OrmResult<(String, String)> {
        let target = self.target();
        match self.kind {
            RelationKind::ManyToOne => {
                let fk = owner.field(self.via).ok_or_else(|| {
                    OrmError::ModelDefinition(format!(
                        "{} has no field '{}' for relation '{}'",
                        owner.name, self.via, self.name
                    ))
                })?;
                Ok((fk.column.clone(), target.pk_column().to_string()))
            }
            RelationKind::OneToMany => {
                let fk = target.field(self.via).ok_or_else(|| {
                    OrmError::ModelDefinition(format!(
                        "{} has no field '{}' for relation '{}.{}'",
                        target.name, self.via, owner.name, self.name
                    ))
                })?;
                Ok((owner.pk_column().to_string(), fk.column.clone()))
            }
        }
    }
}

/// Metadata describing one entity and its table.
///
/// # Examples
///
/// ```
/// use ormkit_db::entity::EntityMeta;
/// use ormkit_db::fields::{FieldDef, FieldType};
///
/// let meta = EntityMeta::builder("Category")
///     .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
///     .field(FieldDef::new("name", FieldType::CharField))
///     .build()
///     .unwrap();
///
/// assert_eq!(meta.table, "categorys");
/// assert_eq!(meta.pk_name(), "id");
/// ```
#[derive(Debug)]
pub struct EntityMeta {
    /// The entity name (e.g. "Item").
    pub name: &'static str,
    /// The database table name.
    pub table: String,
    /// Persisted fields in declaration order, including foreign keys.
    pub fields: Vec<FieldDef>,
    /// Forward relations (one per foreign key) followed by reverse relations.
    pub relations: Vec<RelationDef>,
    pk_index: usize,
}

impl EntityMeta {
    /// Starts describing an entity named `name`.
    pub fn builder(name: &'static str) -> EntityBuilder {
        EntityBuilder {
            name,
            table: None,
            fields: Vec::new(),
            reverse: Vec::new(),
        }
    }

    /// Returns the primary key field.
    pub fn pk_field(&self) -> &FieldDef {
        &self.fields[self.pk_index]
    }

    /// Returns the primary key field name.
    pub fn pk_name(&self) -> &'static str {
        self.pk_field().name
    }

    /// Returns the primary key column.
    pub fn pk_column(&self) -> &str {
        &self.pk_field().column
    }

    /// Returns the kind of value the primary key holds.
    pub fn pk_kind(&self) -> ValueKind {
        self.pk_field().value_kind()
    }

    /// Maps the `pk` alias to the primary key field name.
    pub fn resolve_name<'a>(&self, name: &'a str) -> &'a str {
        if name == "pk" {
            self.pk_name()
        } else {
            name
        }
    }

    /// Looks up a persisted field by name. Accepts the `pk` alias.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        let name = self.resolve_name(name);
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Names of persisted fields that are not relations.
    pub fn own_field_names(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| !f.is_relation())
            .map(|f| f.name)
            .collect()
    }

    /// Names of foreign key fields.
    pub fn relation_field_names(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.is_relation())
            .map(|f| f.name)
            .collect()
    }

    /// Position of a field in declaration order.
    pub fn field_position(&self, name: &str) -> Option<usize> {
        let name = self.resolve_name(name);
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Builder returned by [`EntityMeta::builder`].
#[derive(Debug)]
pub struct EntityBuilder {
    name: &'static str,
    table: Option<String>,
    fields: Vec<FieldDef>,
    reverse: Vec<(Option<String>, fn() -> &'static EntityMeta, &'static str)>,
}

impl EntityBuilder {
    /// Overrides the table name. Defaults to the lower-cased entity name
    /// followed by `s`.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Adds a persisted field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares a one-to-many relation: `target` rows point back at this
    /// entity through their `via` foreign key. The relation is named after the
    /// target, lower-cased, followed by `s`.
    ///
    /// The target's metadata is read while building, so it must not read
    /// this entity's metadata during its own construction.
    #[must_use]
    pub fn has_many(mut self, target: fn() -> &'static EntityMeta, via: &'static str) -> Self {
        self.reverse.push((None, target, via));
        self
    }

    /// Declares a one-to-many relation under an explicit name.
    #[must_use]
    pub fn has_many_named(
        mut self,
        name: impl Into<String>,
        target: fn() -> &'static EntityMeta,
        via: &'static str,
    ) -> Self {
        self.reverse.push((Some(name.into()), target, via));
        self
    }

    /// Validates the definition.
    ///
    /// Fails with [`OrmError::ModelDefinition`] unless exactly one primary
    /// key is declared and every field and relation name is unique.
    pub fn build(self) -> OrmResult<EntityMeta> {
        let mut pks = self.fields.iter().enumerate().filter(|(_, f)| f.primary_key);
        let pk_index = match (pks.next(), pks.next()) {
            (Some((index, _)), None) => index,
            (None, _) => {
                return Err(OrmError::ModelDefinition(
                    "Table has to have a primary key.".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(OrmError::ModelDefinition(
                    "Only one primary key column is allowed.".to_string(),
                ))
            }
        };

        let mut relations: Vec<RelationDef> = self
            .fields
            .iter()
            .filter_map(|f| match f.field_type {
                crate::fields::FieldType::ForeignKey { target } => Some(RelationDef {
                    name: f.name.to_string(),
                    kind: RelationKind::ManyToOne,
                    target,
                    via: f.name,
                }),
                _ => None,
            })
            .collect();

        for (name, target, via) in self.reverse {
            let name = name.unwrap_or_else(|| format!("{}s", target().name.to_lowercase()));
            relations.push(RelationDef {
                name,
                kind: RelationKind::OneToMany,
                target,
                via,
            });
        }

        let mut seen = std::collections::HashSet::new();
        let names = self
            .fields
            .iter()
            .map(|f| f.name)
            .chain(relations.iter().filter(|r| r.is_many()).map(|r| r.name.as_str()));
        for name in names {
            if name == "pk" || !seen.insert(name) {
                return Err(OrmError::ModelDefinition(format!(
                    "Field '{name}' is declared more than once on {}",
                    self.name
                )));
            }
        }

        Ok(EntityMeta {
            name: self.name,
            table: self
                .table
                .unwrap_or_else(|| format!("{}s", self.name.to_lowercase())),
            fields: self.fields,
            relations,
            pk_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;
    use std::sync::LazyLock;

    fn author_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("Author")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField))
                .has_many(book_meta, "author")
                .build()
                .unwrap()
        });
        &META
    }

    fn book_meta() -> &'static EntityMeta {
        static META: LazyLock<EntityMeta> = LazyLock::new(|| {
            EntityMeta::builder("Book")
                .table("library_books")
                .field(FieldDef::new("id", FieldType::UuidField).primary_key())
                .field(FieldDef::new("title", FieldType::CharField))
                .field(FieldDef::foreign_key("author", author_meta).column("author_id"))
                .build()
                .unwrap()
        });
        &META
    }

    #[test]
    fn test_default_table_name() {
        assert_eq!(author_meta().table, "authors");
        assert_eq!(book_meta().table, "library_books");
    }

    #[test]
    fn test_pk_accessors() {
        let meta = book_meta();
        assert_eq!(meta.pk_name(), "id");
        assert_eq!(meta.pk_column(), "id");
        assert_eq!(meta.pk_kind(), ValueKind::Uuid);
        assert_eq!(meta.field("pk").unwrap().name, "id");
    }

    #[test]
    fn test_own_and_relation_field_names() {
        let meta = book_meta();
        assert_eq!(meta.own_field_names(), vec!["id", "title"]);
        assert_eq!(meta.relation_field_names(), vec!["author"]);
    }

    #[test]
    fn test_foreign_key_kind_follows_target_pk() {
        let fk = book_meta().field("author").unwrap();
        assert_eq!(fk.value_kind(), ValueKind::Int);
        assert_eq!(fk.target().unwrap().name, "Author");
    }

    #[test]
    fn test_reverse_relation_default_name() {
        let rel = author_meta().relation("books").unwrap();
        assert_eq!(rel.kind, RelationKind::OneToMany);
        assert_eq!(rel.target().name, "Book");
        assert_eq!(
            rel.join_columns(author_meta()).unwrap(),
            ("id".to_string(), "author_id".to_string())
        );
    }

    #[test]
    fn test_forward_relation_join_columns() {
        let rel = book_meta().relation("author").unwrap();
        assert_eq!(rel.kind, RelationKind::ManyToOne);
        assert_eq!(
            rel.join_columns(book_meta()).unwrap(),
            ("author_id".to_string(), "id".to_string())
        );
    }

    #[test]
    fn test_missing_primary_key() {
        let err = EntityMeta::builder("Loose")
            .field(FieldDef::new("name", FieldType::CharField))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Table has to have a primary key."));
    }

    #[test]
    fn test_two_primary_keys() {
        let err = EntityMeta::builder("Twin")
            .field(FieldDef::new("a", FieldType::IntegerField).primary_key())
            .field(FieldDef::new("b", FieldType::IntegerField).primary_key())
            .build()
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Only one primary key column is allowed."));
    }

    #[test]
    fn test_duplicate_field_name() {
        let err = EntityMeta::builder("Dup")
            .field(FieldDef::new("id", FieldType::AutoField).primary_key())
            .field(FieldDef::new("name", FieldType::CharField))
            .field(FieldDef::new("name", FieldType::TextField))
            .build()
            .unwrap_err();
        assert!(matches!(err, OrmError::ModelDefinition(_)));
    }
}
