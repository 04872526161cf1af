// docbackup/src/storage/s3.rs
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::ObjectCannedAcl;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{entry_name, BackupStorage, StoredEntry, BACKUP_PREFIX};
use crate::config::S3Config;
use crate::errors::{AppError, Result};

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO, ...).
pub struct S3Storage {
    client: s3::Client,
    bucket: String,
    endpoint_url: String,
    folder_prefix: Option<String>,
    public_read: bool,
}

impl S3Storage {
    /// Builds the client. No request is sent until the first operation.
    pub async fn connect(config: &S3Config) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        let client = s3::Client::from_conf(
            s3::config::Builder::from(&sdk_config)
                .force_path_style(true)
                .build(),
        );

        Self {
            client,
            bucket: config.bucket_name.clone(),
            endpoint_url: config.endpoint_url.clone(),
            folder_prefix: config.folder_prefix.clone(),
            public_read: config.public_read,
        }
    }

    fn key_prefix(&self) -> String {
        key_prefix(self.folder_prefix.as_deref())
    }

    fn entry_for(&self, name: &str) -> StoredEntry {
        let key = format!("{}{}", self.key_prefix(), name);
        let url = public_object_url(&self.endpoint_url, &self.bucket, &key);
        StoredEntry::new(name, key, Some(url))
    }
}

/// Key prefix for archives, honouring an optional operator folder.
pub(crate) fn key_prefix(folder_prefix: Option<&str>) -> String {
    match folder_prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(folder) => format!("{}/{}", folder, BACKUP_PREFIX),
        None => BACKUP_PREFIX.to_string(),
    }
}

/// Path-style URL of an object.
pub(crate) fn public_object_url(endpoint_url: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", endpoint_url.trim_end_matches('/'), bucket, key)
}

fn s3_error<E>(action: &str, err: E) -> AppError
where
    E: std::error::Error,
{
    AppError::Connection(format!("Failed to {}: {}", action, DisplayErrorContext(err)))
}

#[async_trait]
impl BackupStorage for S3Storage {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key_prefix())
    }

    async fn list(&self) -> Result<Vec<StoredEntry>> {
        let prefix = self.key_prefix();
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| s3_error(&format!("list objects in {}", self.describe()), e))?;

            for object in response.contents() {
                let Some(name) = object.key().and_then(|key| key.strip_prefix(prefix.as_str())) else {
                    continue;
                };
                if !name.is_empty() && !name.contains('/') {
                    entries.push(self.entry_for(name));
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Found {} objects under {}", entries.len(), self.describe());
        Ok(entries)
    }

    async fn upload(&self, local_path: &Path) -> Result<StoredEntry> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AppError::Config(format!("Cannot upload {}: no file name", local_path.display()))
            })?;
        let entry = self.entry_for(name);

        info!(
            "Uploading {} to S3 bucket {} with key {}",
            local_path.display(),
            self.bucket,
            entry.key
        );

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to read {}: {}",
                local_path.display(),
                e
            )))
        })?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&entry.key)
            .content_type("application/gzip")
            .body(body);
        if self.public_read {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }
        request
            .send()
            .await
            .map_err(|e| s3_error(&format!("upload {}", entry.key), e))?;

        info!("✅ Uploaded {} to bucket {}", entry.key, self.bucket);
        Ok(entry)
    }

    async fn download(&self, name: &str, local_path: &Path) -> Result<()> {
        let key = format!("{}{}", self.key_prefix(), entry_name(name));
        info!(
            "Downloading s3://{}/{} to {}",
            self.bucket,
            key,
            local_path.display()
        );

        let object = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(object) => object,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(AppError::NotFound(format!(
                    "Backup s3://{}/{} does not exist",
                    self.bucket, key
                )));
            }
            Err(e) => return Err(s3_error(&format!("get object {}", key), e)),
        };

        let mut body = object.body.into_async_read();
        let mut file = tokio::fs::File::create(local_path).await?;
        let bytes = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        info!("✅ Downloaded {} bytes from s3://{}/{}", bytes, self.bucket, key);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = format!("{}{}", self.key_prefix(), entry_name(name));
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| s3_error(&format!("delete {}", key), e))?;
        info!("🗑 Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
