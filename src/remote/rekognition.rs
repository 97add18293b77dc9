//! Vision client: Rekognition `DetectText` against an object already in the store.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use crate::core::ObjectLocation;
use crate::error::{Result, SyncError};
use crate::remote::s3::service_error;
use crate::remote::sigv4::{sha256_hex, Signer};
use crate::remote::{TextDetection, TextType, VisionService};

const TARGET: &str = "RekognitionService.DetectText";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectTextRequest<'a> {
    image: ImageRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ImageRef<'a> {
    s3_object: S3ObjectRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct S3ObjectRef<'a> {
    bucket: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectTextResponse {
    #[serde(default)]
    text_detections: Vec<RawDetection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDetection {
    #[serde(default)]
    detected_text: String,
    #[serde(rename = "Type")]
    kind: TextType,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    endpoint: Url,
    signer: Signer,
}

impl VisionClient {
    pub fn new(http: reqwest::Client, endpoint: &str, signer: Signer) -> Result<Self> {
        let endpoint = Url::parse(&format!("{}/", endpoint.trim_end_matches('/')))
            .map_err(|e| SyncError::ConfigurationInvalid(format!("vision endpoint '{}': {}", endpoint, e)))?;
        Ok(Self { http, endpoint, signer })
    }
}

#[async_trait]
impl VisionService for VisionClient {
    async fn detect_text(&self, location: &ObjectLocation) -> Result<Vec<TextDetection>> {
        let body = serde_json::to_vec(&DetectTextRequest {
            image: ImageRef {
                s3_object: S3ObjectRef { bucket: &location.bucket, name: &location.key },
            },
        })?;

        let signed = [("content-type", CONTENT_TYPE), ("x-amz-target", TARGET)];
        let auth = self.signer.sign("POST", &self.endpoint, &signed, &sha256_hex(&body), Utc::now())?;

        let mut req = self.http.post(self.endpoint.clone()).body(body);
        for (k, v) in signed {
            req = req.header(k, v);
        }
        for (k, v) in auth {
            req = req.header(k, v);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(service_error("DetectText", resp).await);
        }

        let parsed: DetectTextResponse = resp.json().await?;
        Ok(parsed
            .text_detections
            .into_iter()
            .map(|d| TextDetection { text: d.detected_text, kind: d.kind, confidence: d.confidence })
            .collect())
    }
}
