//! Field lookups.
//!
//! A [`Lookup`] is one comparison applied to a column. Lookup keys use the
//! double-underscore convention: `name__icontains` compares the `name`
//! column with the `icontains` operator, and a key with no operator suffix
//! means `exact`.

use ormkit_core::{OrmError, OrmResult};

use crate::value::Value;

/// A field-level lookup operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exact match (`field = value`, or `IS NULL` for a null value).
    Exact(Value),
    /// Case-insensitive exact match.
    IExact(Value),
    /// Substring match (`field LIKE '%value%'`).
    Contains(String),
    /// Case-insensitive substring match.
    IContains(String),
    /// Membership test (`field IN (values...)`).
    In(Vec<Value>),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Prefix match.
    StartsWith(String),
    /// Case-insensitive prefix match.
    IStartsWith(String),
    /// Suffix match.
    EndsWith(String),
    /// Case-insensitive suffix match.
    IEndsWith(String),
    /// NULL test (`field IS NULL` when true, `IS NOT NULL` when false).
    IsNull(bool),
}

/// Operator suffixes understood by [`Lookup::from_operator`].
pub const OPERATORS: &[&str] = &[
    "exact",
    "iexact",
    "contains",
    "icontains",
    "in",
    "gt",
    "gte",
    "lt",
    "lte",
    "startswith",
    "istartswith",
    "endswith",
    "iendswith",
    "isnull",
];

/// Returns `true` if `segment` names a lookup operator.
pub fn is_operator(segment: &str) -> bool {
    OPERATORS.contains(&segment)
}

impl Lookup {
    /// Builds a lookup from an operator suffix and a value.
    ///
    /// # Examples
    ///
    /// ```
    /// use ormkit_db::query::lookups::Lookup;
    /// use ormkit_db::value::Value;
    ///
    /// let l = Lookup::from_operator("gte", Value::from(18)).unwrap();
    /// assert_eq!(l, Lookup::Gte(Value::Int(18)));
    /// ```
    pub fn from_operator(operator: &str, value: Value) -> OrmResult<Self> {
        let text = |value: Value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(match operator {
            "exact" => Self::Exact(value),
            "iexact" => Self::IExact(value),
            "contains" => Self::Contains(text(value)),
            "icontains" => Self::IContains(text(value)),
            "in" => match value {
                Value::List(values) => Self::In(values),
                other => Self::In(vec![other]),
            },
            "gt" => Self::Gt(value),
            "gte" => Self::Gte(value),
            "lt" => Self::Lt(value),
            "lte" => Self::Lte(value),
            "startswith" => Self::StartsWith(text(value)),
            "istartswith" => Self::IStartsWith(text(value)),
            "endswith" => Self::EndsWith(text(value)),
            "iendswith" => Self::IEndsWith(text(value)),
            "isnull" => match value {
                Value::Bool(b) => Self::IsNull(b),
                Value::Int(i) => Self::IsNull(i != 0),
                other => {
                    return Err(OrmError::QueryDefinition(format!(
                        "isnull expects a boolean, got {other}"
                    )))
                }
            },
            other => {
                return Err(OrmError::QueryDefinition(format!(
                    "Unknown lookup operator '{other}'"
                )))
            }
        })
    }

}
