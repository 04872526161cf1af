// docbackup/src/config/mod.rs
//! Configuration: `.env`, then an optional `config.json`, with environment
//! variables taking precedence over the JSON file. For every setting the
//! first non-empty variable of its alias list wins.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{AppError, Result};

const DATABASE_URL_VARS: &[&str] = &[
    "DATABASE_URL",
    "MONGO_URL",
    "MONGOLAB_URI",
    "MONGOHQ_URL",
    "DOCSTORE_URL",
];
const UPLOAD_TYPE_VARS: &[&str] = &["UPLOAD_TYPE"];
const S3_BUCKET_VARS: &[&str] = &["S3_BACKUPS_BUCKET", "S3_BACKUP_BUCKET", "S3_BACKUP", "S3_BUCKET"];
const S3_KEY_ID_VARS: &[&str] = &["S3_KEY_ID", "S3_KEY", "S3_ACCESS_KEY", "AWS_ACCESS_KEY_ID"];
const S3_SECRET_VARS: &[&str] = &["S3_SECRET_KEY", "S3_SECRET", "AWS_SECRET_ACCESS_KEY"];
const S3_REGION_VARS: &[&str] = &["S3_REGION", "AWS_REGION"];
const S3_ENDPOINT_VARS: &[&str] = &["S3_ENDPOINT", "AWS_ENDPOINT_URL"];
const S3_FOLDER_VARS: &[&str] = &["S3_FOLDER_PREFIX"];
const S3_PUBLIC_READ_VARS: &[&str] = &["S3_PUBLIC_READ"];
const FTP_HOST_VARS: &[&str] = &["FTP_HOST"];
const FTP_PORT_VARS: &[&str] = &["FTP_PORT"];
const FTP_USERNAME_VARS: &[&str] = &["FTP_USERNAME"];
const FTP_PASSWORD_VARS: &[&str] = &["FTP_PASSWORD"];
const LOCAL_DIR_VARS: &[&str] = &["LOCAL_BACKUP_DIR"];
const WORK_ROOT_VARS: &[&str] = &["TEMP_DUMP_ROOT"];

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_FTP_PORT: u16 = 21;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
    pub public_read: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonFtpStorageConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub database_url: Option<String>,
    pub upload_type: Option<String>,
    pub local_backup_dir: Option<PathBuf>,
    pub temp_dump_root: Option<PathBuf>,
    pub s3_storage: Option<JsonS3StorageConfig>,
    pub ftp_storage: Option<JsonFtpStorageConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq)]
pub struct S3Config {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
    pub public_read: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    S3(S3Config),
    Ftp(FtpConfig),
    Local { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub storage: StorageConfig,
    /// Directory under which per-run working directories are created.
    pub work_root: PathBuf,
}

impl AppConfig {
    /// Loads `.env`, the JSON file at `config_path` (if present) and the process environment.
    pub fn load(config_path: &Path) -> Result<Self> {
        // a missing .env file is normal outside development
        let _ = dotenv::dotenv();
        let raw = read_raw_config(config_path)?;
        Self::resolve(&raw, |name| std::env::var(name).ok())
    }

    /// Builds the configuration from parsed JSON and an environment lookup.
    pub fn resolve<F>(raw: &RawJsonConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvLookup { get: &env };

        let database_url = env
            .first(DATABASE_URL_VARS)
            .or_else(|| non_empty(raw.database_url.as_ref()))
            .ok_or_else(|| missing(DATABASE_URL_VARS, "database_url"))?;

        let upload_type = env
            .first(UPLOAD_TYPE_VARS)
            .or_else(|| non_empty(raw.upload_type.as_ref()))
            .unwrap_or_else(|| "s3".to_string())
            .to_ascii_lowercase();

        let storage = match upload_type.as_str() {
            "s3" => StorageConfig::S3(resolve_s3(&env, raw.s3_storage.as_ref())?),
            "ftp" => StorageConfig::Ftp(resolve_ftp(&env, raw.ftp_storage.as_ref())?),
            "local" => {
                let root = env
                    .first(LOCAL_DIR_VARS)
                    .map(PathBuf::from)
                    .or_else(|| raw.local_backup_dir.clone())
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or_else(|| missing(LOCAL_DIR_VARS, "local_backup_dir"))?;
                StorageConfig::Local { root }
            }
            other => {
                return Err(AppError::Config(format!(
                    "UPLOAD_TYPE must be one of s3, ftp or local, got '{}'",
                    other
                )));
            }
        };

        let work_root = env
            .first(WORK_ROOT_VARS)
            .map(PathBuf::from)
            .or_else(|| raw.temp_dump_root.clone())
            .unwrap_or_else(|| std::env::temp_dir().join("dump"));

        Ok(AppConfig {
            database_url,
            storage,
            work_root,
        })
    }
}

struct EnvLookup<'a, F> {
    get: &'a F,
}

impl<F> EnvLookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// First non-empty value among `names`.
    fn first(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| (self.get)(*name))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn missing(names: &[&str], json_key: &str) -> AppError {
    if names.len() == 1 {
        AppError::Config(format!(
            "Environment variable {} (or '{}' in config.json) must be set",
            names[0], json_key
        ))
    } else {
        AppError::Config(format!(
            "One of these environment variables must be set: {:?} (or '{}' in config.json)",
            names, json_key
        ))
    }
}

fn resolve_s3<F>(env: &EnvLookup<'_, F>, json: Option<&JsonS3StorageConfig>) -> Result<S3Config>
where
    F: Fn(&str) -> Option<String>,
{
    let json = json.cloned().unwrap_or_default();
    let pick = |names: &[&str], fallback: &Option<String>| {
        env.first(names).or_else(|| non_empty(fallback.as_ref()))
    };

    let bucket_name = pick(S3_BUCKET_VARS, &json.bucket_name)
        .ok_or_else(|| missing(S3_BUCKET_VARS, "s3_storage.bucket_name"))?;
    let access_key_id = pick(S3_KEY_ID_VARS, &json.access_key_id)
        .ok_or_else(|| missing(S3_KEY_ID_VARS, "s3_storage.access_key_id"))?;
    let secret_access_key = pick(S3_SECRET_VARS, &json.secret_access_key)
        .ok_or_else(|| missing(S3_SECRET_VARS, "s3_storage.secret_access_key"))?;
    let region =
        pick(S3_REGION_VARS, &json.region).unwrap_or_else(|| DEFAULT_REGION.to_string());
    let endpoint_url = pick(S3_ENDPOINT_VARS, &json.endpoint_url)
        .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", region));
    let folder_prefix = pick(S3_FOLDER_VARS, &json.folder_prefix);
    let public_read = match env.first(S3_PUBLIC_READ_VARS) {
        Some(flag) => parse_flag(&flag)?,
        None => json.public_read.unwrap_or(false),
    };

    Ok(S3Config {
        endpoint_url,
        region,
        access_key_id,
        secret_access_key,
        bucket_name,
        folder_prefix,
        public_read,
    })
}

fn resolve_ftp<F>(env: &EnvLookup<'_, F>, json: Option<&JsonFtpStorageConfig>) -> Result<FtpConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let json = json.cloned().unwrap_or_default();
    let pick = |names: &[&str], fallback: &Option<String>| {
        env.first(names).or_else(|| non_empty(fallback.as_ref()))
    };

    let host = pick(FTP_HOST_VARS, &json.host)
        .ok_or_else(|| missing(FTP_HOST_VARS, "ftp_storage.host"))?;
    let username = pick(FTP_USERNAME_VARS, &json.username)
        .ok_or_else(|| missing(FTP_USERNAME_VARS, "ftp_storage.username"))?;
    let password = pick(FTP_PASSWORD_VARS, &json.password)
        .ok_or_else(|| missing(FTP_PASSWORD_VARS, "ftp_storage.password"))?;
    let port = match env.first(FTP_PORT_VARS) {
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| AppError::Config(format!("FTP_PORT must be a port number, got '{}'", port)))?,
        None => json.port.unwrap_or(DEFAULT_FTP_PORT),
    };

    Ok(FtpConfig {
        host,
        port,
        username,
        password,
    })
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!("Expected a boolean flag, got '{}'", other))),
    }
}

fn read_raw_config(config_path: &Path) -> Result<RawJsonConfig> {
    if !config_path.exists() {
        debug!("No config file at {}, using environment only", config_path.display());
        return Ok(RawJsonConfig::default());
    }
    let config_content = fs::read_to_string(config_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read config file at {}: {}",
            config_path.display(),
            e
        ))
    })?;
    serde_json::from_str(&config_content).map_err(|e| {
        AppError::Config(format!(
            "Failed to parse JSON from config file at {}: {}",
            config_path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_s3_from_environment_aliases() -> anyhow::Result<()> {
        let env = env_of(&[
            ("MONGO_URL", "postgres://app@db/app"),
            ("S3_BUCKET", "fallback-bucket"),
            ("S3_BACKUP_BUCKET", "primary-bucket"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("S3_SECRET", "shh"),
        ]);
        let config = AppConfig::resolve(&RawJsonConfig::default(), env)?;

        assert_eq!(config.database_url, "postgres://app@db/app");
        let StorageConfig::S3(s3) = config.storage else {
            panic!("expected S3 storage");
        };
        // earlier alias wins
        assert_eq!(s3.bucket_name, "primary-bucket");
        assert_eq!(s3.access_key_id, "AKIA");
        assert_eq!(s3.secret_access_key, "shh");
        assert_eq!(s3.region, "us-east-1");
        assert_eq!(s3.endpoint_url, "https://s3.us-east-1.amazonaws.com");
        assert!(!s3.public_read);
        Ok(())
    }

    #[test]
    fn test_empty_variables_are_ignored() {
        let env = env_of(&[
            ("DATABASE_URL", "  "),
            ("MONGO_URL", "postgres://x/y"),
            ("UPLOAD_TYPE", "local"),
            ("LOCAL_BACKUP_DIR", "/var/backups"),
        ]);
        let config = AppConfig::resolve(&RawJsonConfig::default(), env).unwrap();
        assert_eq!(config.database_url, "postgres://x/y");
        assert_eq!(
            config.storage,
            StorageConfig::Local { root: PathBuf::from("/var/backups") }
        );
    }

    #[test]
    fn test_hosted_provider_database_aliases() {
        let local = [("UPLOAD_TYPE", "local"), ("LOCAL_BACKUP_DIR", "/var/backups")];
        for alias in ["MONGOLAB_URI", "MONGOHQ_URL"] {
            let mut pairs = local.to_vec();
            pairs.push((alias, "postgres://hosted/db"));
            let config = AppConfig::resolve(&RawJsonConfig::default(), env_of(&pairs)).unwrap();
            assert_eq!(config.database_url, "postgres://hosted/db");
        }

        let env = env_of(&[
            ("MONGOHQ_URL", "postgres://hq/db"),
            ("MONGOLAB_URI", "postgres://lab/db"),
            ("UPLOAD_TYPE", "local"),
            ("LOCAL_BACKUP_DIR", "/var/backups"),
        ]);
        let config = AppConfig::resolve(&RawJsonConfig::default(), env).unwrap();
        assert_eq!(config.database_url, "postgres://lab/db");
    }

    #[test]
    fn test_missing_database_url_is_config_error() {
        let err = AppConfig::resolve(&RawJsonConfig::default(), env_of(&[])).unwrap_err();
        match err {
            AppError::Config(msg) => assert!(msg.contains("DATABASE_URL")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_s3_credentials_is_config_error() {
        let env = env_of(&[("DATABASE_URL", "postgres://x/y"), ("S3_BUCKET", "b")]);
        let err = AppConfig::resolve(&RawJsonConfig::default(), env).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("S3_KEY_ID")));
    }

    #[test]
    fn test_json_config_with_env_override() -> anyhow::Result<()> {
        let raw: RawJsonConfig = serde_json::from_value(json!({
            "database_url": "postgres://json/db",
            "upload_type": "ftp",
            "temp_dump_root": "/srv/dump",
            "ftp_storage": {"host": "ftp.json", "port": 2121, "username": "u", "password": "p"}
        }))?;
        let env = env_of(&[("FTP_HOST", "ftp.env")]);
        let config = AppConfig::resolve(&raw, env)?;

        assert_eq!(config.database_url, "postgres://json/db");
        assert_eq!(config.work_root, PathBuf::from("/srv/dump"));
        assert_eq!(
            config.storage,
            StorageConfig::Ftp(FtpConfig {
                host: "ftp.env".into(),
                port: 2121,
                username: "u".into(),
                password: "p".into(),
            })
        );
        Ok(())
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_type = env_of(&[("DATABASE_URL", "postgres://x/y"), ("UPLOAD_TYPE", "dropbox")]);
        assert!(matches!(
            AppConfig::resolve(&RawJsonConfig::default(), bad_type),
            Err(AppError::Config(_))
        ));

        let bad_port = env_of(&[
            ("DATABASE_URL", "postgres://x/y"),
            ("UPLOAD_TYPE", "ftp"),
            ("FTP_HOST", "h"),
            ("FTP_USERNAME", "u"),
            ("FTP_PASSWORD", "p"),
            ("FTP_PORT", "twenty-one"),
        ]);
        assert!(matches!(
            AppConfig::resolve(&RawJsonConfig::default(), bad_port),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_public_read_flag() -> anyhow::Result<()> {
        let env = env_of(&[
            ("DATABASE_URL", "postgres://x/y"),
            ("S3_BUCKET", "b"),
            ("S3_KEY", "k"),
            ("S3_SECRET", "s"),
            ("S3_PUBLIC_READ", "yes"),
            ("S3_ENDPOINT", "https://nyc3.digitaloceanspaces.com"),
            ("S3_FOLDER_PREFIX", "prod"),
        ]);
        let config = AppConfig::resolve(&RawJsonConfig::default(), env)?;
        let StorageConfig::S3(s3) = config.storage else {
            panic!("expected S3 storage");
        };
        assert!(s3.public_read);
        assert_eq!(s3.endpoint_url, "https://nyc3.digitaloceanspaces.com");
        assert_eq!(s3.folder_prefix.as_deref(), Some("prod"));
        Ok(())
    }

    #[test]
    fn test_missing_config_file_is_empty_config() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let raw = read_raw_config(&dir.path().join("config.json"))?;
        assert!(raw.database_url.is_none());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json")?;
        assert!(matches!(read_raw_config(&broken), Err(AppError::Config(_))));
        Ok(())
    }
}
