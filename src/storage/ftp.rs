// docbackup/src/storage/ftp.rs
//! FTP target. The client is blocking, so every operation runs on the
//! blocking pool with its own short-lived connection.

use std::path::Path;

use async_trait::async_trait;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, FtpStream, Mode, Status};
use tracing::info;

use super::{entry_name, BackupStorage, StoredEntry, BACKUP_PREFIX};
use crate::config::FtpConfig;
use crate::errors::{AppError, Result};

pub struct FtpStorage {
    config: FtpConfig,
}

impl FtpStorage {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    fn entry_for(&self, name: &str) -> StoredEntry {
        let key = format!("{}{}", BACKUP_PREFIX, name);
        let url = format!("ftp://{}:{}/{}", self.config.host, self.config.port, key);
        StoredEntry::new(name, key, Some(url))
    }

    async fn run<T, F>(&self, action: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> FtpResult<T> + Send + 'static,
    {
        let config = self.config.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut ftp = open_session(&config)?;
            let result = op(&mut ftp);
            // the server may already have closed the control connection
            let _ = ftp.quit();
            result
        })
        .await
        .map_err(|e| AppError::Connection(format!("FTP task for {} aborted: {}", action, e)))?;

        outcome.map_err(|e| {
            AppError::Connection(format!(
                "FTP {} on {}:{} failed: {}",
                action, self.config.host, self.config.port, e
            ))
        })
    }
}

fn open_session(config: &FtpConfig) -> FtpResult<FtpStream> {
    let mut ftp = FtpStream::connect(format!("{}:{}", config.host, config.port))?;
    ftp.login(config.username.as_str(), config.password.as_str())?;
    ftp.set_mode(Mode::Passive);
    ftp.transfer_type(FileType::Binary)?;
    Ok(ftp)
}

fn backups_dir() -> &'static str {
    BACKUP_PREFIX.trim_end_matches('/')
}

/// A 550 reply: the path does not exist or is not accessible as a directory.
pub(crate) fn is_unavailable(err: &FtpError) -> bool {
    matches!(err, FtpError::UnexpectedResponse(response) if response.status == Status::FileUnavailable)
}

/// Names as returned by NLST may carry a directory part depending on the server.
pub(crate) fn listed_names(raw: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = raw
        .iter()
        .map(|line| entry_name(line.trim()).to_string())
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .collect();
    names.sort();
    names.dedup();
    names
}

#[async_trait]
impl BackupStorage for FtpStorage {
    fn describe(&self) -> String {
        format!("ftp://{}:{}/{}", self.config.host, self.config.port, BACKUP_PREFIX)
    }

    async fn list(&self) -> Result<Vec<StoredEntry>> {
        let raw = self
            .run("list", |ftp| match ftp.cwd(backups_dir()) {
                Ok(()) => ftp.nlst(None),
                // no backups directory yet means no backups
                Err(e) if is_unavailable(&e) => Ok(Vec::new()),
                Err(e) => Err(e),
            })
            .await?;
        Ok(listed_names(raw)
            .iter()
            .map(|name| self.entry_for(name))
            .collect())
    }

    async fn upload(&self, local_path: &Path) -> Result<StoredEntry> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AppError::Config(format!("Cannot upload {}: no file name", local_path.display()))
            })?
            .to_string();
        let mut file = std::fs::File::open(local_path)?;

        let remote_name = name.clone();
        let bytes = self
            .run("upload", move |ftp| {
                match ftp.cwd(backups_dir()) {
                    Ok(()) => {}
                    Err(e) if is_unavailable(&e) => {
                        ftp.mkdir(backups_dir())?;
                        ftp.cwd(backups_dir())?;
                    }
                    Err(e) => return Err(e),
                }
                ftp.put_file(remote_name.as_str(), &mut file)
            })
            .await?;

        info!("✅ Uploaded {} ({} bytes) to {}", name, bytes, self.describe());
        Ok(self.entry_for(&name))
    }

    async fn download(&self, name: &str, local_path: &Path) -> Result<()> {
        let name = entry_name(name).to_string();
        let existing = self.list().await?;
        if !existing.iter().any(|entry| entry.name == name) {
            return Err(AppError::NotFound(format!(
                "Backup {} does not exist in {}",
                name,
                self.describe()
            )));
        }

        let remote_name = name.clone();
        let buffer = self
            .run("download", move |ftp| {
                ftp.cwd(backups_dir())?;
                ftp.retr_as_buffer(remote_name.as_str())
            })
            .await?;

        let contents = buffer.into_inner();
        tokio::fs::write(local_path, &contents).await?;
        info!("✅ Downloaded {} bytes of {} from {}", contents.len(), name, self.describe());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let name = entry_name(name).to_string();
        let remote_name = name.clone();
        self.run("delete", move |ftp| {
            ftp.cwd(backups_dir())?;
            ftp.rm(remote_name.as_str())
        })
        .await?;
        info!("🗑 Deleted {} from {}", name, self.describe());
        Ok(())
    }
}
