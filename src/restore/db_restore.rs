// docbackup/src/restore/db_restore.rs
use tracing::{debug, info, warn};

use crate::database::DocumentDatabase;
use crate::errors::{AppError, Result};
use crate::snapshot::{Document, Snapshot, Value, SYSTEM_INDEXES, SYSTEM_PREFIX};

const NAMESPACE_FIELD: &str = "ns";
const ID_FIELD: &str = "_id";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub collections: usize,
    pub documents: usize,
    pub indexes: usize,
    pub skipped_indexes: usize,
}

/// Replays `snapshot` into `database`.
///
/// Regular collections are dropped, recreated and filled first; index records
/// follow once every collection holds its final documents. Nothing is rolled
/// back on failure, so the destination may be left partially loaded.
pub async fn restore_snapshot(
    snapshot: &Snapshot,
    database: &dyn DocumentDatabase,
) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();

    for (name, documents) in &snapshot.collections {
        if name.starts_with(SYSTEM_PREFIX) {
            debug!("Skipping reserved collection {}", name);
            continue;
        }
        restore_collection(database, name, documents).await?;
        report.collections += 1;
        report.documents += documents.len();
    }

    if let Some(index_records) = snapshot.collections.get(SYSTEM_INDEXES) {
        let source = snapshot.source_database();
        let destination = database.name();
        info!(
            "Restoring {} index records ({} -> {})",
            index_records.len(),
            source.unwrap_or("unknown"),
            destination
        );
        for record in index_records {
            if !record.contains_key(ID_FIELD) {
                warn!("Skipping index record without {}: {:?}", ID_FIELD, record);
                report.skipped_indexes += 1;
                continue;
            }
            let remapped = remap_index_record(record, source, destination);
            database
                .insert(SYSTEM_INDEXES, &remapped)
                .await
                .map_err(|e| restore_failure(SYSTEM_INDEXES, e))?;
            report.indexes += 1;
        }
    }

    info!(
        "✓ Restored {} collections, {} documents, {} indexes into '{}'",
        report.collections,
        report.documents,
        report.indexes,
        database.name()
    );
    Ok(report)
}

async fn restore_collection(
    database: &dyn DocumentDatabase,
    name: &str,
    documents: &[Document],
) -> Result<()> {
    database
        .drop_collection(name)
        .await
        .map_err(|e| restore_failure(name, e))?;
    database
        .create_collection(name)
        .await
        .map_err(|e| restore_failure(name, e))?;
    for document in documents {
        database
            .insert(name, document)
            .await
            .map_err(|e| restore_failure(name, e))?;
    }
    debug!("   {}: {} documents", name, documents.len());
    Ok(())
}

fn remap_index_record(record: &Document, source: Option<&str>, destination: &str) -> Document {
    let mut remapped = record.clone();
    if let Some(Value::String(ns)) = remapped.get_mut(NAMESPACE_FIELD) {
        *ns = remap_namespace(ns, source, destination);
    }
    remapped
}

/// Rewrites the database component of a `<database>.<collection>` namespace.
pub fn remap_namespace(ns: &str, source: Option<&str>, destination: &str) -> String {
    if let Some(collection) = source.and_then(|s| ns.strip_prefix(s)?.strip_prefix('.')) {
        return format!("{}.{}", destination, collection);
    }
    match ns.split_once('.') {
        Some((database, collection)) => {
            warn!(
                "Index namespace '{}' does not belong to source database {:?}; replacing '{}'",
                ns, source, database
            );
            format!("{}.{}", destination, collection)
        }
        None => {
            warn!("Index namespace '{}' has no database component; left unchanged", ns);
            ns.to_string()
        }
    }
}

fn restore_failure(collection: &str, err: AppError) -> AppError {
    match err {
        AppError::Restore(_) => err,
        other => AppError::Restore(format!("Failed to restore '{}': {}", collection, other)),
    }
}
