// In-memory document database used by tests.

use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::DocumentDatabase;
use crate::errors::{AppError, Result};
use crate::snapshot::{Document, SYSTEM_INDEXES};

pub struct MemoryDatabase {
    name: String,
    collections: Mutex<IndexMap<String, Vec<Document>>>,
    failing_collection: Option<String>,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collections: Mutex::new(IndexMap::new()),
            failing_collection: None,
        }
    }

    pub fn with_collection(self, name: &str, documents: Vec<Document>) -> Self {
        self.collections
            .lock()
            .unwrap()
            .insert(name.to_string(), documents);
        self
    }

    /// Makes every insert into `name` fail.
    pub fn failing_inserts_into(mut self, name: &str) -> Self {
        self.failing_collection = Some(name.to_string());
        self
    }

    pub fn collection(&self, name: &str) -> Option<Vec<Document>> {
        self.collections.lock().unwrap().get(name).cloned()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl DocumentDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.collection_names())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.collection(collection)
            .ok_or_else(|| AppError::Connection(format!("no collection '{}'", collection)))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        Ok(self.collection(collection).map_or(0, |docs| docs.len() as u64))
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collections.lock().unwrap().shift_remove(collection);
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(collection) {
            return Err(AppError::Connection(format!(
                "collection '{}' already exists",
                collection
            )));
        }
        collections.insert(collection.to_string(), Vec::new());
        Ok(())
    }

    async fn insert(&self, collection: &str, document: &Document) -> Result<()> {
        if self.failing_collection.as_deref() == Some(collection) {
            return Err(AppError::Connection(format!(
                "insert into '{}' refused",
                collection
            )));
        }
        let mut collections = self.collections.lock().unwrap();
        let documents = collections.entry(collection.to_string()).or_default();
        if collection == SYSTEM_INDEXES
            && documents.iter().any(|existing| same_index(existing, document))
        {
            return Ok(());
        }
        documents.push(document.clone());
        Ok(())
    }
}

fn same_index(a: &Document, b: &Document) -> bool {
    a.contains_key("name") && a.get("ns") == b.get("ns") && a.get("name") == b.get("name")
}
