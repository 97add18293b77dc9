// FILE: src/remote/factory.rs
//! Client construction
//!
//! Builds the object-store and vision clients from an explicit `Config`.
//! Misconfiguration is a `ConfigurationInvalid` value, a failed HTTP client
//! build is `Unavailable`. Neither path panics.

use std::sync::Arc;
use std::time::Duration;
use crate::config::{Config, Scheme};
use crate::error::{Result, SyncError};
use crate::remote::sigv4::{Credentials, Signer};
use crate::remote::{ObjectStore, S3Client, VisionClient, VisionService};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Longest silence tolerated from the store: per HEAD/DELETE, and per stalled
/// stretch of an upload. A PUT that keeps moving has no overall cap.
pub const STORAGE_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const VISION_TIMEOUT: Duration = Duration::from_secs(10);

fn credentials(config: &Config) -> Credentials {
    Credentials {
        access_key_id: config.storage.access_key_id.trim().to_string(),
        secret_access_key: config.storage.secret_access_key.trim().to_string(),
    }
}

fn http_client(scheme: Scheme, timeout: Option<Duration>, purpose: &str) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .https_only(scheme == Scheme::Https);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| {
            tracing::error!("[ClientFactory] Failed to build {} client: {}", purpose, e);
            SyncError::Unavailable(format!("{} client: {}", purpose, e))
        })
}

pub fn build_storage_client(config: &Config) -> Result<S3Client> {
    let scheme = config.validate_storage()?;
    let endpoint = config.storage_endpoint()?;
    let http = http_client(scheme, None, "storage")?;
    let signer = Signer::new(credentials(config), config.storage.region.trim(), "s3");
    Ok(S3Client::new(http, &endpoint, signer, STORAGE_READ_TIMEOUT))
}

pub fn build_vision_client(config: &Config) -> Result<VisionClient> {
    let scheme = config.validate_storage()?;
    let endpoint = config.vision_endpoint()?;
    let http = http_client(scheme, Some(VISION_TIMEOUT), "vision")?;
    let signer = Signer::new(credentials(config), config.storage.region.trim(), "rekognition");
    VisionClient::new(http, &endpoint, signer)
}

/// Hands out clients to the sweeps. A fresh client per run means a config
/// fix takes effect on the next tick.
pub trait ClientProvider: Send + Sync {
    fn storage(&self) -> Result<Arc<dyn ObjectStore>>;
    fn vision(&self) -> Result<Arc<dyn VisionService>>;
}

pub struct HttpClientFactory {
    config: Arc<Config>,
}

impl HttpClientFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl ClientProvider for HttpClientFactory {
    fn storage(&self) -> Result<Arc<dyn ObjectStore>> {
        Ok(Arc::new(build_storage_client(&self.config)?))
    }

    fn vision(&self) -> Result<Arc<dyn VisionService>> {
        Ok(Arc::new(build_vision_client(&self.config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.storage.access_key_id = "AKID".into();
        config.storage.secret_access_key = "secret".into();
        config
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut config = configured();
        config.storage.access_key_id.clear();
        assert!(matches!(build_storage_client(&config), Err(SyncError::ConfigurationInvalid(_))));
        assert!(matches!(build_vision_client(&config), Err(SyncError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let mut config = configured();
        config.storage.scheme = "gopher".into();
        assert!(matches!(build_storage_client(&config), Err(SyncError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_builds_with_default_endpoints() {
        let client = build_storage_client(&configured()).unwrap();
        assert_eq!(client.endpoint(), "https://s3.us-east-1.amazonaws.com");
        assert_eq!(client.read_timeout(), STORAGE_READ_TIMEOUT);
        assert!(build_vision_client(&configured()).is_ok());
    }

    #[test]
    fn test_provider_surfaces_config_errors() {
        let provider = HttpClientFactory::new(Arc::new(Config::default()));
        assert!(matches!(provider.storage(), Err(SyncError::ConfigurationInvalid(_))));
        assert!(matches!(provider.vision(), Err(SyncError::ConfigurationInvalid(_))));
    }
}
