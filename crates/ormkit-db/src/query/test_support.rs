//! Models and a scripted transport shared by the query tests.

use std::sync::LazyLock;

use ormkit_core::OrmResult;
use tokio::sync::Mutex as TokioMutex;

use crate::database::{Database, ExecuteResult, GeneratedKey};
use crate::entity::EntityMeta;
use crate::fields::{FieldDef, FieldType};
use crate::model::{ForeignKey, Model, Record, RelatedValue};
use crate::query::compiler::{DatabaseBackendType, Row};
use crate::value::Value;

pub(crate) fn artist_meta() -> &'static EntityMeta {
    static META: LazyLock<EntityMeta> = LazyLock::new(|| {
        EntityMeta::builder("Artist")
            .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
            .field(FieldDef::new("name", FieldType::CharField))
            .has_many(album_meta, "artist")
            .build()
            .unwrap()
    });
    &META
}

pub(crate) fn album_meta() -> &'static EntityMeta {
    static META: LazyLock<EntityMeta> = LazyLock::new(|| {
        EntityMeta::builder("Album")
            .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
            .field(FieldDef::new("title", FieldType::CharField))
            .field(FieldDef::new("year", FieldType::IntegerField).nullable())
            .field(
                FieldDef::foreign_key("artist", artist_meta)
                    .column("artist_id")
                    .nullable(),
            )
            .build()
            .unwrap()
    });
    &META
}

pub(crate) fn ticket_meta() -> &'static EntityMeta {
    static META: LazyLock<EntityMeta> = LazyLock::new(|| {
        EntityMeta::builder("Ticket")
            .field(
                FieldDef::new("code", FieldType::UuidField)
                    .primary_key()
                    .default_with(|| Value::Uuid(uuid::Uuid::new_v4())),
            )
            .field(FieldDef::new("seat", FieldType::CharField))
            .field(FieldDef::new("used", FieldType::BooleanField).default(false))
            .build()
            .unwrap()
    });
    &META
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Artist {
    pub id: Option<i64>,
    pub name: String,
    pub albums: Vec<Album>,
}

impl Model for Artist {
    fn meta() -> &'static EntityMeta {
        artist_meta()
    }

    fn from_record(record: Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.get_as("id")?,
            name: record.get_as("name")?,
            albums: record
                .related_many("albums")
                .iter()
                .cloned()
                .map(Album::from_record)
                .collect::<OrmResult<_>>()?,
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new(artist_meta())
            .with("id", self.id)
            .with("name", self.name.as_str());
        if !self.albums.is_empty() {
            record.set_related(
                "albums",
                RelatedValue::Many(self.albums.iter().map(Model::to_record).collect()),
            );
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Album {
    pub id: Option<i64>,
    pub title: String,
    pub year: Option<i64>,
    pub artist: ForeignKey<Artist>,
}

impl Album {
    pub(crate) fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            year: None,
            artist: ForeignKey::Key(Value::Null),
        }
    }
}

impl Model for Album {
    fn meta() -> &'static EntityMeta {
        album_meta()
    }

    fn from_record(record: Record) -> OrmResult<Self> {
        Ok(Self {
            id: record.get_as("id")?,
            title: record.get_as("title")?,
            year: record.get_as("year")?,
            artist: ForeignKey::read(&record, "artist")?,
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new(album_meta())
            .with("id", self.id)
            .with("title", self.title.as_str())
            .with("year", self.year);
        self.artist.write(&mut record, "artist");
        record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Ticket {
    pub code: Option<uuid::Uuid>,
    pub seat: String,
    pub used: Option<bool>,
}

impl Model for Ticket {
    fn meta() -> &'static EntityMeta {
        ticket_meta()
    }

    fn from_record(record: Record) -> OrmResult<Self> {
        Ok(Self {
            code: record.get_as("code")?,
            seat: record.get_as("seat")?,
            used: record.get_as("used")?,
        })
    }

    fn to_record(&self) -> Record {
        Record::new(ticket_meta())
            .with("code", self.code)
            .with("seat", self.seat.as_str())
            .with("used", self.used)
    }
}

pub(crate) fn album_row(id: i64, title: &str) -> Row {
    Row::from_pairs([
        ("id", Value::Int(id)),
        ("title", Value::from(title)),
        ("year", Value::Null),
        ("artist_id", Value::Null),
    ])
}

pub(crate) fn artist_row(id: i64, name: &str, album: Option<(i64, &str)>) -> Row {
    let (album_id, title) = match album {
        Some((album_id, title)) => (Value::Int(album_id), Value::from(title)),
        None => (Value::Null, Value::Null),
    };
    let artist_ref = if album_id.is_null() {
        Value::Null
    } else {
        Value::Int(id)
    };
    Row::from_pairs([
        ("id", Value::Int(id)),
        ("name", Value::from(name)),
        ("albums__id", album_id),
        ("albums__title", title),
        ("albums__year", Value::Null),
        ("albums__artist_id", artist_ref),
    ])
}

/// A transport that records every statement and replays scripted results.
pub(crate) struct MockDb {
    backend: DatabaseBackendType,
    statements: TokioMutex<Vec<(String, Vec<Value>)>>,
    query_responses: TokioMutex<Vec<Vec<Row>>>,
    generated_key: GeneratedKey,
    rows_affected: u64,
}

impl MockDb {
    pub(crate) fn new(backend: DatabaseBackendType) -> Self {
        Self {
            backend,
            statements: TokioMutex::new(Vec::new()),
            query_responses: TokioMutex::new(Vec::new()),
            generated_key: GeneratedKey::None,
            rows_affected: 1,
        }
    }

    pub(crate) fn with_responses(responses: Vec<Vec<Row>>) -> Self {
        let db = Self::new(DatabaseBackendType::SQLite);
        Self {
            query_responses: TokioMutex::new(responses),
            ..db
        }
    }

    pub(crate) fn with_rows(rows: Vec<Row>) -> Self {
        Self::with_responses(vec![rows])
    }

    pub(crate) fn with_value(value: Value) -> Self {
        Self::with_rows(vec![Row::from_pairs([("value", value)])])
    }

    pub(crate) fn generated_key(mut self, key: GeneratedKey) -> Self {
        self.generated_key = key;
        self
    }

    pub(crate) fn rows_affected(mut self, rows: u64) -> Self {
        self.rows_affected = rows;
        self
    }

    pub(crate) async fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl Database for MockDb {
    fn backend_type(&self) -> DatabaseBackendType {
        self.backend
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        self.statements
            .lock()
            .await
            .push((sql.to_string(), params.to_vec()));
        let mut responses = self.query_responses.lock().await;
        if responses.is_empty() {
            Ok(vec![])
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<ExecuteResult> {
        self.statements
            .lock()
            .await
            .push((sql.to_string(), params.to_vec()));
        Ok(ExecuteResult {
            rows_affected: self.rows_affected,
            generated_key: self.generated_key.clone(),
        })
    }
}
