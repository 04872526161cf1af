// docbackup/src/restore/logic.rs
use std::path::PathBuf;

use tracing::info;

use super::db_restore::{restore_snapshot, RestoreReport};
use super::verification::verify_restore;
use crate::backup::archive::decode_snapshot;
use crate::errors::{AppError, Result};
use crate::session::Session;
use crate::storage::http::{fetch_url, is_url};
use crate::storage::{entry_name, is_backup_file_name, BackupStorage, StoredEntry};

/// Source argument selecting the most recent stored backup.
pub const MOST_RECENT_SOURCE: &str = "latest";

/// Where the archive to restore comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// Archive already on the local filesystem.
    Local(PathBuf),
    /// Entry of the configured storage target, by name.
    Remote(String),
    /// Plain HTTP(S) download.
    Url(String),
    MostRecent,
}

impl ArchiveSource {
    pub fn parse(source: &str, fetch: bool) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(AppError::Config("Restore source must not be empty".to_string()));
        }
        Ok(if source.eq_ignore_ascii_case(MOST_RECENT_SOURCE) {
            ArchiveSource::MostRecent
        } else if is_url(source) {
            ArchiveSource::Url(source.to_string())
        } else if fetch {
            ArchiveSource::Remote(entry_name(source).to_string())
        } else {
            ArchiveSource::Local(PathBuf::from(source))
        })
    }
}

/// Latest entry whose name is a timestamped archive name.
///
/// Every entry is inspected; the listing order of the backend is not relied on.
pub fn most_recent(entries: &[StoredEntry]) -> Option<&StoredEntry> {
    entries
        .iter()
        .filter(|entry| is_backup_file_name(&entry.name))
        .max_by(|a, b| a.name.cmp(&b.name))
}

pub async fn find_most_recent(storage: &dyn BackupStorage) -> Result<StoredEntry> {
    let entries = storage.list().await?;
    most_recent(&entries).cloned().ok_or_else(|| {
        AppError::NotFound(format!(
            "No backups found in {} ({} entries listed)",
            storage.describe(),
            entries.len()
        ))
    })
}

pub async fn perform_restore_orchestration(
    session: &Session,
    source: &ArchiveSource,
) -> Result<RestoreReport> {
    let work_dir = session.working_dir()?;

    let archive_path = match source {
        ArchiveSource::Local(path) => {
            info!("Using local archive {}", path.display());
            path.clone()
        }
        ArchiveSource::Url(url) => fetch_url(url, work_dir.path()).await?,
        ArchiveSource::Remote(name) => {
            let dest = work_dir.path().join(name);
            session.storage.download(name, &dest).await?;
            dest
        }
        ArchiveSource::MostRecent => {
            let entry = find_most_recent(session.storage.as_ref()).await?;
            info!("🔍 Most recent backup: {}", entry.name);
            let dest = work_dir.path().join(&entry.name);
            session.storage.download(&entry.name, &dest).await?;
            dest
        }
    };

    let snapshot = decode_snapshot(&archive_path)?;
    let report = restore_snapshot(&snapshot, session.database.as_ref()).await?;
    verify_restore(&snapshot, session.database.as_ref()).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::encode_snapshot;
    use crate::database::memory::MemoryDatabase;
    use crate::snapshot::{document_from_json, Snapshot, SYSTEM_INDEXES};
    use crate::storage::http::serve_files;
    use crate::storage::local::LocalStorage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;

    fn entries(names: &[&str]) -> Vec<StoredEntry> {
        names
            .iter()
            .map(|n| StoredEntry::new(*n, format!("backups/{}", n), None))
            .collect()
    }

    struct Listing(Vec<StoredEntry>);

    #[async_trait]
    impl BackupStorage for Listing {
        fn describe(&self) -> String {
            "fixed listing".to_string()
        }
        async fn list(&self) -> Result<Vec<StoredEntry>> {
            Ok(self.0.clone())
        }
        async fn upload(&self, _: &Path) -> Result<StoredEntry> {
            unreachable!()
        }
        async fn download(&self, _: &str, _: &Path) -> Result<()> {
            unreachable!()
        }
        async fn delete(&self, _: &str) -> Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn test_parse_source() {
        assert_eq!(ArchiveSource::parse("latest", true).unwrap(), ArchiveSource::MostRecent);
        assert_eq!(ArchiveSource::parse("LATEST", false).unwrap(), ArchiveSource::MostRecent);
        assert_eq!(
            ArchiveSource::parse("https://cdn.example.com/backups/a.gz", true).unwrap(),
            ArchiveSource::Url("https://cdn.example.com/backups/a.gz".into())
        );
        assert_eq!(
            ArchiveSource::parse("backups/2023-01-01_00-00-00.gz", true).unwrap(),
            ArchiveSource::Remote("2023-01-01_00-00-00.gz".into())
        );
        assert_eq!(
            ArchiveSource::parse("/tmp/2023-01-01_00-00-00.gz", false).unwrap(),
            ArchiveSource::Local(PathBuf::from("/tmp/2023-01-01_00-00-00.gz"))
        );
        assert!(matches!(ArchiveSource::parse("  ", true), Err(AppError::Config(_))));
    }

    #[test]
    fn test_most_recent_ignores_non_matching_names() {
        let listed = entries(&["2023-01-01_00-00-00.gz", "2023-01-02_00-00-00.gz", "notes.txt"]);
        assert_eq!(most_recent(&listed).unwrap().name, "2023-01-02_00-00-00.gz");
    }

    #[test]
    fn test_most_recent_scans_whole_listing() {
        let listed = entries(&[
            "2023-05-01_00-00-00.gz",
            "zz-notes.txt",
            "2022-01-01_00-00-00.gz",
            "README",
            "2024-02-03_04-05-06.gz",
        ]);
        assert_eq!(most_recent(&listed).unwrap().name, "2024-02-03_04-05-06.gz");
    }

    #[tokio::test]
    async fn test_find_most_recent_not_found() {
        let empty = Listing(Vec::new());
        assert!(matches!(find_most_recent(&empty).await, Err(AppError::NotFound(_))));

        let unrelated = Listing(entries(&["notes.txt", "2023-01-01.gz"]));
        assert!(matches!(find_most_recent(&unrelated).await, Err(AppError::NotFound(_))));
    }

    fn snapshot_of(db: &str, marker: &str) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.insert_collection(
            "orders",
            vec![document_from_json(json!({"_id": 1, "marker": marker})).unwrap()],
        );
        snapshot.insert_collection(
            SYSTEM_INDEXES,
            vec![document_from_json(json!({"_id": "i1", "ns": format!("{}.orders", db), "name": "marker_1"})).unwrap()],
        );
        snapshot.set_source_database(db);
        snapshot
    }

    fn seed_archive(store_root: &Path, name: &str, marker: &str) {
        let path = store_root.join("backups").join(name);
        encode_snapshot(&snapshot_of("A", marker), &path).unwrap();
    }

    fn session_with(store_root: &Path, work_root: &Path) -> Session {
        Session::new(
            Box::new(MemoryDatabase::new("B")),
            Box::new(LocalStorage::new(store_root.to_path_buf())),
            work_root.to_path_buf(),
        )
    }

    async fn restored_marker(session: &Session) -> Option<String> {
        let docs = session.database.find_all("orders").await.unwrap();
        docs[0]["marker"].as_str().map(str::to_string)
    }

    #[tokio::test]
    async fn test_restore_most_recent_from_storage() {
        let store_root = tempfile::tempdir().unwrap();
        let work_root = tempfile::tempdir().unwrap();
        seed_archive(store_root.path(), "2023-01-01_00-00-00.gz", "old");
        seed_archive(store_root.path(), "2023-01-02_00-00-00.gz", "new");
        std::fs::write(store_root.path().join("backups").join("notes.txt"), b"hi").unwrap();

        let session = session_with(store_root.path(), work_root.path());
        let report = perform_restore_orchestration(&session, &ArchiveSource::MostRecent)
            .await
            .unwrap();

        assert_eq!(report.collections, 1);
        assert_eq!(report.indexes, 1);
        assert_eq!(restored_marker(&session).await.as_deref(), Some("new"));
        let indexes = session.database.find_all(SYSTEM_INDEXES).await.unwrap();
        assert_eq!(indexes[0]["ns"].as_str(), Some("B.orders"));
        // downloaded archive removed with the working directory
        assert_eq!(std::fs::read_dir(work_root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_restore_named_and_local_archives() {
        let store_root = tempfile::tempdir().unwrap();
        let work_root = tempfile::tempdir().unwrap();
        seed_archive(store_root.path(), "2023-01-01_00-00-00.gz", "old");
        seed_archive(store_root.path(), "2023-01-02_00-00-00.gz", "new");
        let session = session_with(store_root.path(), work_root.path());

        let named = ArchiveSource::parse("backups/2023-01-01_00-00-00.gz", true).unwrap();
        perform_restore_orchestration(&session, &named).await.unwrap();
        assert_eq!(restored_marker(&session).await.as_deref(), Some("old"));

        let local_path = store_root.path().join("backups").join("2023-01-02_00-00-00.gz");
        let local = ArchiveSource::parse(local_path.to_str().unwrap(), false).unwrap();
        perform_restore_orchestration(&session, &local).await.unwrap();
        assert_eq!(restored_marker(&session).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_archives() {
        let store_root = tempfile::tempdir().unwrap();
        let work_root = tempfile::tempdir().unwrap();
        let session = session_with(store_root.path(), work_root.path());

        let missing = ArchiveSource::Remote("2020-01-01_00-00-00.gz".into());
        assert!(matches!(
            perform_restore_orchestration(&session, &missing).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            perform_restore_orchestration(&session, &ArchiveSource::MostRecent).await,
            Err(AppError::NotFound(_))
        ));

        let corrupt = store_root.path().join("broken.gz");
        std::fs::write(&corrupt, b"garbage").unwrap();
        assert!(matches!(
            perform_restore_orchestration(&session, &ArchiveSource::Local(corrupt)).await,
            Err(AppError::CorruptArchive(_))
        ));
        // nothing written before the archive decoded
        assert!(session.database.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_from_url() {
        let store_root = tempfile::tempdir().unwrap();
        let work_root = tempfile::tempdir().unwrap();
        seed_archive(store_root.path(), "2023-03-04_05-06-07.gz", "fetched");
        let bytes = std::fs::read(store_root.path().join("backups").join("2023-03-04_05-06-07.gz")).unwrap();
        let base = serve_files(vec![("/dl/2023-03-04_05-06-07.gz".into(), bytes)]).await;

        let session = session_with(store_root.path(), work_root.path());
        let source = ArchiveSource::parse(&format!("{}/dl/2023-03-04_05-06-07.gz", base), true).unwrap();
        let report = perform_restore_orchestration(&session, &source).await.unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(restored_marker(&session).await.as_deref(), Some("fetched"));

        let missing = ArchiveSource::Url(format!("{}/dl/2020-01-01_00-00-00.gz", base));
        assert!(matches!(
            perform_restore_orchestration(&session, &missing).await,
            Err(AppError::NotFound(_))
        ));
    }
}
