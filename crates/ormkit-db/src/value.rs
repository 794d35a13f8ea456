//! Backend-agnostic database values.
//!
//! The [`Value`] enum carries field values, query parameters, and result
//! columns between the query layer and the transports. [`ValueKind`] is the
//! type tag of a value, used to compare a driver-returned key against the
//! type an entity declares for its primary key.

use std::fmt;

/// A backend-agnostic representation of a database value.
///
/// # Examples
///
/// ```
/// use ormkit_db::value::{Value, ValueKind};
///
/// let v = Value::from(42_i64);
/// assert_eq!(v, Value::Int(42));
/// assert_eq!(v.kind(), ValueKind::Int);
///
/// let v = Value::from(None::<String>);
/// assert!(v.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A date without time.
    Date(chrono::NaiveDate),
    /// A date and time without timezone.
    DateTime(chrono::NaiveDateTime),
    /// A date and time with UTC timezone.
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    /// A UUID value.
    Uuid(uuid::Uuid),
    /// A JSON value.
    Json(serde_json::Value),
    /// A list of values, used for `IN` lookups.
    List(Vec<Value>),
}

/// The type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Date,
    DateTime,
    DateTimeTz,
    Uuid,
    Json,
    List,
}

impl Value {
    /// Returns `true` if this value is SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the type tag of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Date(_) => ValueKind::Date,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::DateTimeTz(_) => ValueKind::DateTimeTz,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Json(_) => ValueKind::Json,
            Self::List(_) => ValueKind::List,
        }
    }

    /// Converts this value to the given kind where the conversion is lossless.
    ///
    /// Transports hand back what the driver reports: `SQLite` returns UUIDs
    /// and timestamps as text and booleans as integers. Materialization uses
    /// this to restore the declared type of a column. Values that cannot be
    /// converted are returned unchanged.
    pub fn coerce(self, kind: ValueKind) -> Self {
        match (self, kind) {
            (Self::Int(i), ValueKind::Bool) => Self::Bool(i != 0),
            (Self::Int(i), ValueKind::Float) => Self::Float(i as f64),
            (Self::String(s), ValueKind::Uuid) => match uuid::Uuid::parse_str(&s) {
                Ok(u) => Self::Uuid(u),
                Err(_) => Self::String(s),
            },
            (Self::String(s), ValueKind::Date) => match s.parse::<chrono::NaiveDate>() {
                Ok(d) => Self::Date(d),
                Err(_) => Self::String(s),
            },
            (Self::String(s), ValueKind::DateTime) => match s
                .parse::<chrono::NaiveDateTime>()
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f"))
            {
                Ok(dt) => Self::DateTime(dt),
                Err(_) => Self::String(s),
            },
            (Self::String(s), ValueKind::DateTimeTz) => {
                match s.parse::<chrono::DateTime<chrono::Utc>>() {
                    Ok(dt) => Self::DateTimeTz(dt),
                    Err(_) => Self::String(s),
                }
            }
            (Self::String(s), ValueKind::Json) => match serde_json::from_str(&s) {
                Ok(j) => Self::Json(j),
                Err(_) => Self::String(s),
            },
            (value, _) => value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Uuid(u) => write!(f, "{u}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => String,
    chrono::NaiveDate => Date,
    chrono::NaiveDateTime => DateTime,
    chrono::DateTime<chrono::Utc> => DateTimeTz,
    uuid::Uuid => Uuid,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}
