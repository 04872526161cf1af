// docbackup/src/restore/verification.rs
use tracing::info;

use crate::database::DocumentDatabase;
use crate::errors::{AppError, Result};
use crate::snapshot::{Snapshot, SYSTEM_PREFIX};

/// Checks that every restored collection holds as many documents as the snapshot.
///
/// Reserved `system.` collections are not compared. Mismatches are collected
/// and reported together.
pub async fn verify_restore(snapshot: &Snapshot, database: &dyn DocumentDatabase) -> Result<()> {
    println!(
        "Performing restore verification for database: {}",
        database.name()
    );

    let mut mismatches = Vec::new();
    for (name, documents) in &snapshot.collections {
        if name.starts_with(SYSTEM_PREFIX) {
            continue;
        }
        let expected = documents.len() as u64;
        let found = database
            .count(name)
            .await
            .map_err(|e| AppError::Restore(format!("Could not count '{}': {}", name, e)))?;
        if found != expected {
            mismatches.push(format!("{} (expected {}, found {})", name, expected, found));
        }
    }

    if !mismatches.is_empty() {
        return Err(AppError::Restore(format!(
            "Document counts differ after restore: {}",
            mismatches.join(", ")
        )));
    }

    info!("✓ Restore verification passed for {}", database.name());
    Ok(())
}
