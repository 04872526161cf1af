// docbackup/src/backup/db_dump.rs
use tracing::{debug, info};

use crate::database::DocumentDatabase;
use crate::errors::Result;
use crate::snapshot::{Snapshot, SYSTEM_INDEXES};

/// Reads every collection of `database` into a [`Snapshot`].
///
/// Collections are read one after another; the first failed read abandons
/// the whole capture. When the index catalog is read, the database name is
/// recorded so index namespaces can be rewritten on restore.
pub async fn dump_database(database: &dyn DocumentDatabase) -> Result<Snapshot> {
    let collections = database.list_collections().await?;
    info!(
        "🔍 Dumping {} collections from database '{}'",
        collections.len(),
        database.name()
    );

    let mut snapshot = Snapshot::default();
    for name in collections {
        if name == SYSTEM_INDEXES {
            snapshot.set_source_database(database.name());
        }
        let documents = database.find_all(&name).await?;
        debug!("   {}: {} documents", name, documents.len());
        snapshot.insert_collection(name, documents);
    }

    info!(
        "✓ Dumped {} documents from database '{}'",
        snapshot.document_count(),
        database.name()
    );
    Ok(snapshot)
}
