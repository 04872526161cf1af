use std::path::PathBuf;

use tempfile::TempDir;
use tracing::info;

use crate::config::AppConfig;
use crate::database::{self, DocumentDatabase};
use crate::errors::Result;
use crate::storage::{self, BackupStorage};
use crate::utils::{create_working_dir, redact_url};

/// Handles owned for the duration of one backup or restore run.
pub struct Session {
    pub database: Box<dyn DocumentDatabase>,
    pub storage: Box<dyn BackupStorage>,
    pub work_root: PathBuf,
}

impl Session {
    pub fn new(
        database: Box<dyn DocumentDatabase>,
        storage: Box<dyn BackupStorage>,
        work_root: PathBuf,
    ) -> Self {
        Self {
            database,
            storage,
            work_root,
        }
    }

    /// Connects to the database and builds the storage backend described by `config`.
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let storage = storage::from_config(&config.storage).await?;
        info!(
            "Connecting to {} (storage: {})",
            redact_url(&config.database_url),
            storage.describe()
        );
        let database = database::connect(&config.database_url).await?;
        Ok(Self::new(database, storage, config.work_root.clone()))
    }

    /// Fresh private working directory, removed when the handle is dropped.
    pub fn working_dir(&self) -> Result<TempDir> {
        create_working_dir(&self.work_root)
    }
}
