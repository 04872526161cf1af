//! Remote storage targets for backup archives.
//!
//! Every backend keeps archives under the [`BACKUP_PREFIX`] and lists them
//! sorted by name, so timestamped archive names sort chronologically.

pub(crate) mod ftp;
pub(crate) mod http;
pub(crate) mod local;
pub(crate) mod s3;

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use regex::Regex;

use crate::config::StorageConfig;
use crate::errors::Result;

pub const BACKUP_PREFIX: &str = "backups/";
pub const ARCHIVE_EXTENSION: &str = "gz";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

static BACKUP_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2}\.gz$").expect("valid backup name pattern")
});

/// A backup archive held by a storage target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Archive file name, without the `backups/` prefix.
    pub name: String,
    /// Full key or path of the entry inside the target.
    pub key: String,
    pub public_url: Option<String>,
}

impl StoredEntry {
    pub fn new(name: impl Into<String>, key: impl Into<String>, public_url: Option<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            public_url,
        }
    }

    /// Public URL when the backend has one, the storage key otherwise.
    pub fn reference(&self) -> &str {
        self.public_url.as_deref().unwrap_or(&self.key)
    }
}

#[async_trait]
pub trait BackupStorage: Send + Sync {
    /// Human readable description of the target, for logs.
    fn describe(&self) -> String;

    /// Entries under `backups/`, sorted by name.
    async fn list(&self) -> Result<Vec<StoredEntry>>;

    /// Stores `local_path` as `backups/<file name>`.
    async fn upload(&self, local_path: &Path) -> Result<StoredEntry>;

    /// Fetches the entry `name` into `local_path`, replacing any existing file.
    async fn download(&self, name: &str, local_path: &Path) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// Builds the storage backend selected in configuration.
pub async fn from_config(config: &StorageConfig) -> Result<Box<dyn BackupStorage>> {
    Ok(match config {
        StorageConfig::S3(s3_config) => Box::new(s3::S3Storage::connect(s3_config).await),
        StorageConfig::Ftp(ftp_config) => Box::new(ftp::FtpStorage::new(ftp_config.clone())),
        StorageConfig::Local { root } => Box::new(local::LocalStorage::new(root.clone())),
    })
}

/// Archive file name for a capture taken at `at`.
pub fn archive_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}.{}", at.format(TIMESTAMP_FORMAT), ARCHIVE_EXTENSION)
}

/// Whether `name` is a timestamped archive name produced by [`archive_file_name`].
pub fn is_backup_file_name(name: &str) -> bool {
    BACKUP_NAME_PATTERN.is_match(name)
}

/// Reduces a user supplied entry name such as `backups/x.gz` to its file name.
pub fn entry_name(raw: &str) -> &str {
    raw.rsplit('/').next().unwrap_or(raw)
}
