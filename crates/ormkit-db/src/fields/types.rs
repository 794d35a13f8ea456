//! Field type definitions.
//!
//! Each [`FieldType`] variant names a column type and the scalar
//! [`ValueKind`] its values carry. [`FieldDef`] captures everything the query
//! layer needs to know about one persisted field: its column, nullability,
//! whether the database generates it, and an optional lazily evaluated
//! default.

use std::fmt;
use std::sync::Arc;

use crate::entity::EntityMeta;
use crate::value::{Value, ValueKind};

/// Produces a default value for a field. Invoked only when an insert omits
/// the field.
pub type DefaultProvider = Arc<dyn Fn() -> Value + Send + Sync>;

/// The type of a persisted field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Variable-length string.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// UUID field.
    UuidField,
    /// Raw binary data.
    BinaryField,
    /// JSON data.
    JsonField,
    /// Many-to-one relationship. The column stores the target's primary key.
    ForeignKey {
        /// The related entity. Resolved lazily so entities may refer to each other.
        target: fn() -> &'static EntityMeta,
    },
}

impl FieldType {
    /// Returns the kind of value stored in a column of this type.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::AutoField | Self::BigAutoField | Self::IntegerField | Self::BigIntegerField => {
                ValueKind::Int
            }
            Self::CharField | Self::TextField => ValueKind::String,
            Self::FloatField => ValueKind::Float,
            Self::BooleanField => ValueKind::Bool,
            Self::DateField => ValueKind::Date,
            Self::DateTimeField => ValueKind::DateTime,
            Self::UuidField => ValueKind::Uuid,
            Self::BinaryField => ValueKind::Bytes,
            Self::JsonField => ValueKind::Json,
            Self::ForeignKey { target } => target().pk_kind(),
        }
    }

    /// Returns `true` for types whose values the database generates.
    pub const fn is_auto(&self) -> bool {
        matches!(self, Self::AutoField | Self::BigAutoField)
    }

    /// Returns the SQL column type on `SQLite`.
    pub fn sqlite_column_type(&self) -> &'static str {
        match self.value_kind() {
            ValueKind::Int | ValueKind::Bool => "INTEGER",
            ValueKind::Float => "REAL",
            ValueKind::Bytes => "BLOB",
            _ => "TEXT",
        }
    }

    /// Returns the SQL column type on `PostgreSQL`.
    pub fn pg_column_type(&self) -> &'static str {
        match self {
            Self::AutoField => "SERIAL",
            Self::BigAutoField => "BIGSERIAL",
            Self::CharField => "VARCHAR",
            Self::TextField => "TEXT",
            Self::IntegerField => "INTEGER",
            Self::BigIntegerField => "BIGINT",
            Self::FloatField => "DOUBLE PRECISION",
            Self::BooleanField => "BOOLEAN",
            Self::DateField => "DATE",
            Self::DateTimeField => "TIMESTAMP",
            Self::UuidField => "UUID",
            Self::BinaryField => "BYTEA",
            Self::JsonField => "JSONB",
            Self::ForeignKey { target } => match target().pk_field().field_type {
                Self::AutoField => "INTEGER",
                Self::BigAutoField => "BIGINT",
                ref other => other.pg_column_type(),
            },
        }
    }
}

/// Definition of a persisted field.
///
/// # Examples
///
/// ```
/// use ormkit_db::fields::{FieldDef, FieldType};
/// use ormkit_db::value::Value;
///
/// let id = FieldDef::new("id", FieldType::BigAutoField).primary_key();
/// assert!(id.autoincrement);
///
/// let active = FieldDef::new("active", FieldType::BooleanField).default(true);
/// assert_eq!(active.default_value(), Some(Value::Bool(true)));
/// ```
#[derive(Clone)]
pub struct FieldDef {
    /// The attribute name of this field.
    pub name: &'static str,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Whether the database generates the value when it is omitted.
    pub autoincrement: bool,
    /// Default value provider for inserts that omit this field.
    pub default: Option<DefaultProvider>,
}

impl FieldDef {
    /// Creates a non-null field with no default. Auto field types start out
    /// with `autoincrement` set.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name.to_string(),
            autoincrement: field_type.is_auto(),
            field_type,
            primary_key: false,
            null: false,
            default: None,
        }
    }

    /// Creates a many-to-one field pointing at `target`.
    pub fn foreign_key(name: &'static str, target: fn() -> &'static EntityMeta) -> Self {
        Self::new(name, FieldType::ForeignKey { target })
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Marks the value as generated by the database.
    #[must_use]
    pub const fn autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    /// Sets a constant default value.
    #[must_use]
    pub fn default(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default_with(move || value.clone())
    }

    /// Sets a default produced by `provider` each time an insert needs it.
    #[must_use]
    pub fn default_with(mut self, provider: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(Arc::new(provider));
        self
    }

    /// Returns `true` if a default is declared.
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Invokes the default provider.
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(|provider| provider())
    }

    /// Returns `true` for many-to-one fields.
    pub const fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::ForeignKey { .. })
    }

    /// Returns the related entity for many-to-one fields.
    pub fn target(&self) -> Option<&'static EntityMeta> {
        match self.field_type {
            FieldType::ForeignKey { target } => Some(target()),
            _ => None,
        }
    }

    /// Returns the kind of value stored in this field's column.
    pub fn value_kind(&self) -> ValueKind {
        self.field_type.value_kind()
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("field_type", &self.field_type)
            .field("primary_key", &self.primary_key)
            .field("null", &self.null)
            .field("autoincrement", &self.autoincrement)
            .field("has_default", &self.has_default())
            .finish()
    }
}
