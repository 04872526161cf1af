mod logic;
pub(crate) mod archive;
pub(crate) mod db_dump;

use anyhow::{Context, Result};
use chrono::Local;

use crate::session::Session;

/// Public entry point for the backup process.
///
/// Keeps the `retain_count` most recent backups after uploading; `0` disables pruning.
pub async fn run_backup_flow(session: &Session, retain_count: usize) -> Result<()> {
    let outcome = logic::perform_backup_orchestration(session, retain_count, &Local::now())
        .await
        .context("Backup process failed")?;

    println!(
        "📦 Backed up {} collections ({} documents)",
        outcome.collections, outcome.documents
    );
    for entry in &outcome.pruned {
        println!("🗑 Pruned {}", entry.name);
    }
    println!("{}", outcome.entry.reference());
    Ok(())
}
