use chrono::{DateTime, TimeZone};
use tracing::info;

use super::archive::encode_snapshot;
use super::db_dump::dump_database;
use crate::errors::Result;
use crate::session::Session;
use crate::storage::{archive_file_name, BackupStorage, StoredEntry};

#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub entry: StoredEntry,
    pub collections: usize,
    pub documents: usize,
    pub pruned: Vec<StoredEntry>,
}

/// Dump, encode, upload, then prune down to `retain_count` backups when it is non-zero.
pub async fn perform_backup_orchestration<Tz>(
    session: &Session,
    retain_count: usize,
    captured_at: &DateTime<Tz>,
) -> Result<BackupOutcome>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let file_name = archive_file_name(captured_at);
    let work_dir = session.working_dir()?;

    let snapshot = dump_database(session.database.as_ref()).await?;
    let archive_path = encode_snapshot(&snapshot, &work_dir.path().join(&file_name))?;
    let entry = session.storage.upload(&archive_path).await?;

    let pruned = if retain_count > 0 {
        prune_old_backups(session.storage.as_ref(), retain_count).await?
    } else {
        Vec::new()
    };

    Ok(BackupOutcome {
        entry,
        collections: snapshot.collections.len(),
        documents: snapshot.document_count(),
        pruned,
    })
}

/// Deletes every entry under `backups/` except the `keep` most recent.
pub async fn prune_old_backups(storage: &dyn BackupStorage, keep: usize) -> Result<Vec<StoredEntry>> {
    let entries = storage.list().await?;
    let total = entries.len();
    let doomed = select_for_pruning(entries, keep);
    if doomed.is_empty() {
        info!("Retention: {} backups stored, keeping up to {}; nothing to prune", total, keep);
        return Ok(doomed);
    }

    info!(
        "🧹 Retention: {} backups stored, keeping {}; deleting {}",
        total,
        keep,
        doomed.len()
    );
    for entry in &doomed {
        storage.delete(&entry.name).await?;
    }
    Ok(doomed)
}

/// The oldest entries beyond the `keep` newest, oldest first. `keep == 0` selects nothing.
pub fn select_for_pruning(mut entries: Vec<StoredEntry>, keep: usize) -> Vec<StoredEntry> {
    if keep == 0 {
        return Vec::new();
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let excess = entries.len().saturating_sub(keep);
    entries.truncate(excess);
    entries
}
