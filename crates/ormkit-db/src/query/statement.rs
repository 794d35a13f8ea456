//! Statement AST and the statement builder.
//!
//! [`build_select`] turns an entity, its select-related paths, and the
//! filter/exclude clauses of a query into a [`SelectStatement`]. Every path
//! becomes a LEFT JOIN (its intermediate prefixes included), every filter
//! clause is ANDed into the WHERE clause, and every exclude clause is ANDed
//! in negated. Joined tables are aliased by their path and their columns
//! labelled `path__column`.
//!
//! Mutations are scoped with [`build_mutation_scope`], which keeps the WHERE
//! clause on the target table when no clause reaches into a joined table and
//! falls back to a primary key subquery otherwise.

use std::collections::BTreeSet;

use ormkit_core::{OrmError, OrmResult};

use super::lookups::Lookup;
use crate::entity::EntityMeta;
use crate::value::Value;

/// A column qualified by the table alias it is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// The relation path of the joined table, or `None` for the root table.
    pub path: Option<String>,
    /// The column name.
    pub column: String,
}

impl ColumnRef {
    /// A column of the root table.
    pub fn root(column: impl Into<String>) -> Self {
        Self {
            path: None,
            column: column.into(),
        }
    }

    /// A column of the table joined at `path`.
    pub fn joined(path: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            column: column.into(),
        }
    }

    /// The label this column is selected under.
    pub fn label(&self) -> String {
        match &self.path {
            Some(path) => format!("{path}__{}", self.column),
            None => self.column.clone(),
        }
    }
}

/// A WHERE clause node.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    /// A single condition.
    Condition {
        /// The compared column.
        column: ColumnRef,
        /// The lookup applied to it.
        lookup: Lookup,
    },
    /// Logical AND of conditions.
    And(Vec<WhereNode>),
    /// Logical OR of conditions.
    Or(Vec<WhereNode>),
    /// Logical NOT of a condition.
    Not(Box<WhereNode>),
}

impl WhereNode {
    /// Returns `true` if any condition reads a joined table.
    pub fn references_joins(&self) -> bool {
        match self {
            Self::Condition { column, .. } => column.path.is_some(),
            Self::And(children) | Self::Or(children) => {
                children.iter().any(Self::references_joins)
            }
            Self::Not(inner) => inner.references_joins(),
        }
    }
}

/// A column ordering term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The ordered column.
    pub column: ColumnRef,
    /// Whether to sort in descending order.
    pub descending: bool,
}

/// A selected column and the label it is returned under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// The source column.
    pub source: ColumnRef,
    /// The result label.
    pub label: String,
}

/// A LEFT JOIN of one select-related path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// The joined table.
    pub table: String,
    /// The alias, equal to the relation path.
    pub alias: String,
    /// The column on the parent side of the join.
    pub parent: ColumnRef,
    /// The column on the joined table.
    pub column: String,
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// The root table.
    pub table: String,
    /// Selected columns.
    pub columns: Vec<SelectColumn>,
    /// Joins, parents before children.
    pub joins: Vec<Join>,
    /// WHERE clause.
    pub where_clause: Option<WhereNode>,
    /// ORDER BY terms.
    pub order_by: Vec<OrderBy>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
}

impl SelectStatement {
    /// Replaces the selected columns with the root primary key only.
    #[must_use]
    pub fn pk_only(mut self, entity: &EntityMeta) -> Self {
        let source = ColumnRef::root(entity.pk_column());
        self.columns = vec![SelectColumn {
            label: source.label(),
            source,
        }];
        self
    }
}

/// An INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// The target table.
    pub table: String,
    /// Inserted columns and values.
    pub values: Vec<(String, Value)>,
    /// Column whose generated value the statement should return.
    pub returning: Option<String>,
}

/// Which rows an UPDATE or DELETE touches.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationScope {
    /// Every row of the table.
    All,
    /// Rows matching a condition on the table itself.
    Where(WhereNode),
    /// Rows whose primary key is returned by a joined select.
    Subquery {
        /// The primary key column of the target table.
        pk_column: String,
        /// A select returning matching primary keys.
        select: Box<SelectStatement>,
    },
}

/// An UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// The target table.
    pub table: String,
    /// Assigned columns and values.
    pub assignments: Vec<(String, Value)>,
    /// The rows to update.
    pub scope: MutationScope,
}

/// A DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// The target table.
    pub table: String,
    /// The rows to delete.
    pub scope: MutationScope,
}

/// A parameterized single-row UPDATE run once per object of a batch.
/// Parameters bind the assigned columns in order, then the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUpdateStatement {
    /// The target table.
    pub table: String,
    /// Assigned columns.
    pub columns: Vec<String>,
    /// The primary key column matched by the WHERE clause.
    pub pk_column: String,
}

/// Combines filter clauses and negated exclude clauses with AND.
pub fn combine_clauses(filter: &[WhereNode], exclude: &[WhereNode]) -> Option<WhereNode> {
    let mut parts: Vec<WhereNode> = filter.to_vec();
    parts.extend(exclude.iter().map(|node| WhereNode::Not(Box::new(node.clone()))));
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(WhereNode::And(parts)),
    }
}

/// Expands `a__b__c` into `a`, `a__b`, `a__b__c`, keeping the set sorted so
/// parents always precede their children.
pub fn expand_paths(select_related: &BTreeSet<String>) -> BTreeSet<String> {
    let mut expanded = BTreeSet::new();
    for path in select_related {
        let mut prefix = String::new();
        for segment in path.split("__") {
            if !prefix.is_empty() {
                prefix.push_str("__");
            }
            prefix.push_str(segment);
            expanded.insert(prefix.clone());
        }
    }
    expanded
}

/// Resolves a relation path to the entity it ends at.
pub fn resolve_path(entity: &'static EntityMeta, path: &str) -> OrmResult<&'static EntityMeta> {
    let mut current = entity;
    for segment in path.split("__") {
        let relation = current.relation(segment).ok_or_else(|| {
            OrmError::QueryDefinition(format!(
                "{} has no relation named '{segment}' (in select_related path '{path}')",
                current.name
            ))
        })?;
        current = relation.target();
    }
    Ok(current)
}

fn build_joins(
    entity: &'static EntityMeta,
    paths: &BTreeSet<String>,
) -> OrmResult<Vec<(Join, &'static EntityMeta)>> {
    let mut joins = Vec::with_capacity(paths.len());
    for path in paths {
        let (parent_path, name) = match path.rsplit_once("__") {
            Some((parent, name)) => (Some(parent), name),
            None => (None, path.as_str()),
        };
        let parent = match parent_path {
            Some(parent) => resolve_path(entity, parent)?,
            None => entity,
        };
        let relation = parent.relation(name).ok_or_else(|| {
            OrmError::QueryDefinition(format!(
                "{} has no relation named '{name}' (in select_related path '{path}')",
                parent.name
            ))
        })?;
        let (parent_column, target_column) = relation.join_columns(parent)?;
        let target = relation.target();
        joins.push((
            Join {
                table: target.table.clone(),
                alias: path.clone(),
                parent: ColumnRef {
                    path: parent_path.map(str::to_string),
                    column: parent_column,
                },
                column: target_column,
            },
            target,
        ));
    }
    Ok(joins)
}

fn field_columns<'a>(
    entity: &'a EntityMeta,
    path: Option<&str>,
) -> impl Iterator<Item = SelectColumn> + 'a {
    let path = path.map(str::to_string);
    entity.fields.iter().map(move |field| {
        let source = ColumnRef {
            path: path.clone(),
            column: field.column.clone(),
        };
        SelectColumn {
            label: source.label(),
            source,
        }
    })
}

/// Resolves an ordering term (`name`, `-name`, `author__name`) against the
/// root entity and the joined paths.
pub fn resolve_order_term(
    entity: &'static EntityMeta,
    joined: &BTreeSet<String>,
    term: &str,
) -> OrmResult<OrderBy> {
    let (descending, name) = match term.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, term),
    };
    let (path, field_name) = match name.rsplit_once("__") {
        Some((path, field)) => (Some(path), field),
        None => (None, name),
    };
    let owner = match path {
        Some(path) if joined.contains(path) => resolve_path(entity, path)?,
        Some(path) => {
            return Err(OrmError::QueryDefinition(format!(
                "Cannot order by '{term}': '{path}' is not in select_related"
            )))
        }
        None => entity,
    };
    let field = owner.field(field_name).ok_or_else(|| {
        OrmError::QueryDefinition(format!(
            "Cannot order by '{term}': {} has no field '{field_name}'",
            owner.name
        ))
    })?;
    Ok(OrderBy {
        column: ColumnRef {
            path: path.map(str::to_string),
            column: field.column.clone(),
        },
        descending,
    })
}

/// Builds the SELECT for a query specification.
pub fn build_select(
    entity: &'static EntityMeta,
    select_related: &BTreeSet<String>,
    filter: &[WhereNode],
    exclude: &[WhereNode],
    order_by: &[String],
    limit: Option<u64>,
    offset: Option<u64>,
) -> OrmResult<SelectStatement> {
    let paths = expand_paths(select_related);
    let joins = build_joins(entity, &paths)?;

    let mut columns: Vec<SelectColumn> = field_columns(entity, None).collect();
    for (join, target) in &joins {
        columns.extend(field_columns(target, Some(&join.alias)));
    }

    let order_by = order_by
        .iter()
        .map(|term| resolve_order_term(entity, &paths, term))
        .collect::<OrmResult<Vec<_>>>()?;

    Ok(SelectStatement {
        table: entity.table.clone(),
        columns,
        joins: joins.into_iter().map(|(join, _)| join).collect(),
        where_clause: combine_clauses(filter, exclude),
        order_by,
        limit,
        offset,
    })
}

/// Builds the row scope of an UPDATE or DELETE.
pub fn build_mutation_scope(
    entity: &'static EntityMeta,
    select_related: &BTreeSet<String>,
    filter: &[WhereNode],
    exclude: &[WhereNode],
) -> OrmResult<MutationScope> {
    let Some(where_clause) = combine_clauses(filter, exclude) else {
        return Ok(MutationScope::All);
    };
    if !where_clause.references_joins() {
        return Ok(MutationScope::Where(where_clause));
    }
    let select = build_select(entity, select_related, filter, exclude, &[], None, None)?;
    Ok(MutationScope::Subquery {
        pk_column: entity.pk_column().to_string(),
        select: Box::new(select.pk_only(entity)),
    })
}
