//! In-memory capture of a document database.
//!
//! A [`Snapshot`] maps collection names to their documents in source-read
//! order. Documents are trees of [`Value`]s with ordered keys so that a
//! restored record is field-for-field identical to the captured one.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Reserved collection holding index metadata records.
pub const SYSTEM_INDEXES: &str = "system.indexes";
/// Collections with this prefix are never recreated as regular collections.
pub const SYSTEM_PREFIX: &str = "system.";
/// Metadata key recording the source database name at capture time.
pub const SOURCE_DB_NAME_KEY: &str = "system.indexes.db.name";

pub type Document = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 beyond i64::MAX and real numbers both land here
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Document(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Document(doc) => document_to_json(doc),
        }
    }
}

pub fn document_to_json(doc: &Document) -> serde_json::Value {
    serde_json::Value::Object(
        doc.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect(),
    )
}

/// Converts a JSON object into a [`Document`]. Returns `None` for any other JSON kind.
pub fn document_from_json(json: serde_json::Value) -> Option<Document> {
    Value::from(json).into_document()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub collections: IndexMap<String, Vec<Document>>,
    pub metadata: IndexMap<String, String>,
}

impl Snapshot {
    /// Adds a collection. A repeated name replaces the earlier documents, keeping
    /// collection names unique.
    pub fn insert_collection(&mut self, name: impl Into<String>, documents: Vec<Document>) {
        self.collections.insert(name.into(), documents);
    }

    pub fn source_database(&self) -> Option<&str> {
        self.metadata.get(SOURCE_DB_NAME_KEY).map(String::as_str)
    }

    pub fn set_source_database(&mut self, name: impl Into<String>) {
        self.metadata.insert(SOURCE_DB_NAME_KEY.to_string(), name.into());
    }

    pub fn document_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}
