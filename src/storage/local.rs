// docbackup/src/storage/local.rs
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use url::Url;

use super::{entry_name, BackupStorage, StoredEntry, BACKUP_PREFIX};
use crate::errors::{AppError, Result};

/// Keeps archives in `<root>/backups/` on the local filesystem.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUP_PREFIX.trim_end_matches('/'))
    }

    fn entry_for(&self, name: &str, path: &Path) -> StoredEntry {
        let public_url = std::path::absolute(path)
            .ok()
            .and_then(|abs| Url::from_file_path(abs).ok())
            .map(String::from);
        StoredEntry::new(name, format!("{}{}", BACKUP_PREFIX, name), public_url)
    }
}

#[async_trait]
impl BackupStorage for LocalStorage {
    fn describe(&self) -> String {
        format!("local directory {}", self.backups_dir().display())
    }

    async fn list(&self) -> Result<Vec<StoredEntry>> {
        let dir = self.backups_dir();
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(item) = read_dir.next_entry().await? {
            if !item.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                entries.push(self.entry_for(name, &item.path()));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn upload(&self, local_path: &Path) -> Result<StoredEntry> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AppError::Config(format!("Cannot upload {}: no file name", local_path.display()))
            })?;
        let dir = self.backups_dir();
        fs::create_dir_all(&dir).await?;

        let dest = dir.join(name);
        fs::copy(local_path, &dest).await?;
        info!("✅ Stored {} at {}", name, dest.display());
        Ok(self.entry_for(name, &dest))
    }

    async fn download(&self, name: &str, local_path: &Path) -> Result<()> {
        let source = self.backups_dir().join(entry_name(name));
        match fs::copy(&source, local_path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound(format!(
                "Backup {} does not exist in {}",
                name,
                self.describe()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.backups_dir().join(entry_name(name));
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound(format!(
                "Backup {} does not exist in {}",
                name,
                self.describe()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
