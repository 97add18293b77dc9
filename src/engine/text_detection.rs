// FILE: src/engine/text_detection.rs
//! Text Detection
//!
//! Runs the vision service against an image that is already in the store
//! (the service reads it by bucket/key, we never send bytes) and filters the
//! detections by confidence and type.

use std::sync::Arc;
use serde::Serialize;
use crate::core::parse_locator;
use crate::error::{Result, SyncError};
use crate::remote::{TextDetection, TextType, VisionService};
use crate::storage::FileRecord;

pub const DEFAULT_CONFIDENCE: f32 = 90.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectOptions {
    /// Detections must score strictly above this
    pub confidence: f32,
    /// Return full detections instead of just the text
    pub full: bool,
    /// `word` or `line` (any case); anything else means no filter
    pub kind: Option<String>,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self { confidence: DEFAULT_CONFIDENCE, full: false, kind: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectedText {
    Full(Vec<TextDetection>),
    Plain(Vec<String>),
}

impl DetectedText {
    pub fn len(&self) -> usize {
        match self {
            DetectedText::Full(d) => d.len(),
            DetectedText::Plain(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct TextDetector {
    vision: Arc<dyn VisionService>,
}

impl TextDetector {
    pub fn new(vision: Arc<dyn VisionService>) -> Self {
        Self { vision }
    }

    pub async fn detect_text(&self, record: &FileRecord, options: &DetectOptions) -> Result<DetectedText> {
        let locator = record
            .remote_locator
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| SyncError::Unavailable(format!("{} is not in the store yet", record)))?;

        if !record.is_image() {
            return Err(SyncError::Unavailable(format!(
                "{} is not an image ({})", record, record.mime_type
            )));
        }

        let location = parse_locator(locator)
            .map_err(|e| SyncError::Unavailable(format!("{}: {}", record, e)))?;

        let detections = self.vision
            .detect_text(&location)
            .await
            .map_err(|e| SyncError::Unavailable(format!("text detection on {}: {}", location, e)))?;
        tracing::debug!("[TextDetector] {} detections for {}", detections.len(), location);

        Ok(filter_detections(detections, options))
    }
}

/// Confidence first, then type, then projection. Order is preserved.
pub fn filter_detections(detections: Vec<TextDetection>, options: &DetectOptions) -> DetectedText {
    let kind = options.kind.as_deref().and_then(TextType::parse);

    let kept = detections
        .into_iter()
        .filter(|d| d.confidence > options.confidence)
        .filter(|d| kind.map_or(true, |k| d.kind == k));

    if options.full {
        DetectedText::Full(kept.collect())
    } else {
        DetectedText::Plain(kept.map(|d| d.text).collect())
    }
}
