use std::fs;
use std::path::Path;

use tempfile::{Builder as TempFileBuilder, TempDir};
use tracing::debug;
use url::Url;

use crate::errors::Result;

/// Creates a private working directory under `root`.
///
/// `root` is created if needed; it already existing is fine. The returned
/// directory and everything in it is removed when the handle is dropped.
pub fn create_working_dir(root: &Path) -> Result<TempDir> {
    fs::create_dir_all(root)?;
    let dir = TempFileBuilder::new().prefix("docbackup_").tempdir_in(root)?;
    debug!("Working directory: {}", dir.path().display());
    Ok(dir)
}

/// Strips the password from a connection URL so it can be logged.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
