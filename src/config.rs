// FILE: src/config.rs
//! Configuration
//!
//! One `Config` value is loaded at startup (TOML file + environment overrides)
//! and handed to everything that needs credentials or paths. Nothing below the
//! binary reads the environment on its own.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::{Result, SyncError};

const ENV_PREFIX: &str = "BUCKETEER_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub vision: VisionConfig,
    pub paths: PathsConfig,
    pub schedule: ScheduleConfig,
    pub queue: QueueConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    /// "http" or "https"
    pub scheme: String,
    pub bucket: String,
    /// S3-compatible endpoint override, e.g. `http://127.0.0.1:9000`
    pub endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-east-1".to_string(),
            scheme: "https".to_string(),
            bucket: String::new(),
            endpoint: None,
        }
    }
}

// Keep the secret out of logs
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &if self.secret_access_key.is_empty() { "" } else { "***" })
            .field("region", &self.region)
            .field("scheme", &self.scheme)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: PathBuf,
    /// Root that `FileRecord::rel_path` is resolved against
    pub data_root: PathBuf,
    pub queue_dir: PathBuf,
    pub lock_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("bucketeer");
        Self {
            database: base.join("bucketeer.db"),
            data_root: base.join("files"),
            queue_dir: base.join("delete_queue"),
            lock_dir: base.join("locks"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    pub upload_budget_secs: u64,
    pub deletion_budget_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: 60, upload_budget_secs: 30, deletion_budget_secs: 10 }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn upload_budget(&self) -> Duration {
        Duration::from_secs(self.upload_budget_secs)
    }

    pub fn deletion_budget(&self) -> Duration {
        Duration::from_secs(self.deletion_budget_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Directory,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(SyncError::ConfigurationInvalid(format!("scheme must be http or https, got '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl Config {
    /// Default location: `<config_dir>/bucketeer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("bucketeer").join("config.toml"))
    }

    /// Load from `path` (or the default location if it exists), then apply
    /// `BUCKETEER_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => {
                    tracing::info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)
            .map_err(|e| SyncError::ConfigurationInvalid(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where F: Fn(&str) -> Option<String>
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(v) = var("ACCESS_KEY_ID") { self.storage.access_key_id = v; }
        if let Some(v) = var("SECRET_ACCESS_KEY") { self.storage.secret_access_key = v; }
        if let Some(v) = var("REGION") { self.storage.region = v; }
        if let Some(v) = var("SCHEME") { self.storage.scheme = v; }
        if let Some(v) = var("BUCKET") { self.storage.bucket = v; }
        if let Some(v) = var("ENDPOINT") { self.storage.endpoint = Some(v); }
    }

    /// Credentials, region and scheme. Bucket is checked separately by the uploader
    /// because deletions and text detection do not need it.
    pub fn validate_storage(&self) -> Result<Scheme> {
        let s = &self.storage;
        if s.access_key_id.trim().is_empty() || s.secret_access_key.trim().is_empty() {
            return Err(SyncError::ConfigurationInvalid("missing access key id or secret".into()));
        }
        if s.region.trim().is_empty() {
            return Err(SyncError::ConfigurationInvalid("missing region".into()));
        }
        Scheme::parse(&s.scheme)
    }

    pub fn storage_endpoint(&self) -> Result<String> {
        let scheme = self.validate_storage()?;
        Ok(match &self.storage.endpoint {
            Some(e) if !e.trim().is_empty() => e.trim().trim_end_matches('/').to_string(),
            _ => format!("{}://s3.{}.amazonaws.com", scheme.as_str(), self.storage.region.trim()),
        })
    }

    pub fn vision_endpoint(&self) -> Result<String> {
        let scheme = self.validate_storage()?;
        Ok(match &self.vision.endpoint {
            Some(e) if !e.trim().is_empty() => e.trim().trim_end_matches('/').to_string(),
            _ => format!("{}://rekognition.{}.amazonaws.com", scheme.as_str(), self.storage.region.trim()),
        })
    }

    pub fn bucket(&self) -> Result<&str> {
        let bucket = self.storage.bucket.trim();
        if bucket.is_empty() {
            return Err(SyncError::ConfigurationInvalid("no target bucket configured".into()));
        }
        Ok(bucket)
    }
}
