mod logic;
pub(crate) mod db_restore;
pub(crate) mod verification;

use anyhow::{Context, Result};

use crate::session::Session;
use crate::storage::BackupStorage;
use logic::ArchiveSource;

pub use logic::MOST_RECENT_SOURCE;

/// Public entry point for the restore process.
///
/// `source` is an archive name, an `http(s)://` URL or `latest`. With
/// `fetch == false` an archive name is read from the local filesystem instead
/// of the storage target.
pub async fn run_restore_flow(session: &Session, source: &str, fetch: bool) -> Result<()> {
    let source = ArchiveSource::parse(source, fetch)?;
    let report = logic::perform_restore_orchestration(session, &source)
        .await
        .context("Restore process failed")?;

    println!(
        "♻️ Restored {} collections ({} documents, {} indexes) into '{}'",
        report.collections,
        report.documents,
        report.indexes,
        session.database.name()
    );
    if report.skipped_indexes > 0 {
        println!("⚠️ Skipped {} index records without _id", report.skipped_indexes);
    }
    Ok(())
}

/// Prints the public reference of the most recent backup.
pub async fn show_most_recent(storage: &dyn BackupStorage) -> Result<()> {
    let entry = logic::find_most_recent(storage)
        .await
        .context("Could not resolve the most recent backup")?;
    println!("{}", entry.reference());
    Ok(())
}
