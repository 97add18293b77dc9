//! Remote services
//!
//! The object store and the vision service, as seen by the engine. Both are
//! traits so sweeps can run against fakes; the HTTP implementations sign
//! requests with SigV4 and carry fixed timeouts.

pub mod sigv4;
pub mod s3;
pub mod rekognition;
pub mod factory;

use std::path::Path;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::core::ObjectLocation;
use crate::error::Result;

pub use s3::S3Client;
pub use rekognition::VisionClient;
pub use factory::{build_storage_client, build_vision_client, ClientProvider, HttpClientFactory};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `source` to `location` with a private ACL. Returns the locator.
    async fn put_file(&self, location: &ObjectLocation, source: &Path, content_type: &str) -> Result<String>;

    /// `Ok(false)` only when the store positively says the object is not there
    async fn exists(&self, location: &ObjectLocation) -> Result<bool>;

    async fn delete(&self, location: &ObjectLocation) -> Result<()>;
}

#[async_trait]
pub trait VisionService: Send + Sync {
    async fn detect_text(&self, location: &ObjectLocation) -> Result<Vec<TextDetection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextType {
    Word,
    Line,
    #[serde(other)]
    Unknown,
}

impl TextType {
    /// Case-insensitive; only WORD and LINE are recognised
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "WORD" => Some(TextType::Word),
            "LINE" => Some(TextType::Line),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TextType,
    /// 0..=100
    pub confidence: f32,
}
