//! Document database capability used by the extractor and the restorer.

pub(crate) mod postgres;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

use crate::errors::Result;
use crate::snapshot::Document;

/// What the backup engine needs from a live document database.
///
/// Implementations report unreachable servers and failed reads/writes as
/// [`crate::errors::AppError::Connection`]; callers decide whether a failure
/// is a restore error.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    /// Name of the database this handle is connected to.
    fn name(&self) -> &str;

    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Every document of a collection, in natural storage order.
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// Drops a collection. Dropping a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> Result<()>;

    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Appends `document` to `collection`, creating the collection if needed.
    ///
    /// Inserting into `system.indexes` a record whose `ns` and `name` are
    /// already recorded is a no-op, so replaying the same index records
    /// leaves the catalog unchanged.
    async fn insert(&self, collection: &str, document: &Document) -> Result<()>;
}

/// Connects to the document store named by `url`.
pub async fn connect(url: &str) -> Result<Box<dyn DocumentDatabase>> {
    let store = postgres::PgDocumentStore::connect(url).await?;
    Ok(Box::new(store))
}
