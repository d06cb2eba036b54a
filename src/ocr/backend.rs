//! OCR backend abstraction.
//!
//! A backend is one OCR engine instance. It goes through the lifecycle
//! `load -> load_language -> initialize` before it can recognize images;
//! `OcrWorker` in `pool` tracks where each instance is in that lifecycle.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Language data not installed: {0}")]
    LanguageNotAvailable(String),

    #[error("Backend used before initialization")]
    NotInitialized,

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of OCR on one image.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    /// Confidence score (0.0 - 1.0), if available.
    pub confidence: Option<f32>,
    pub processing_time_ms: u64,
}

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendType {
    /// Tesseract OCR via command-line.
    #[default]
    Tesseract,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            _ => None,
        }
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OCR engine instance.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Name used in logs and `check` output.
    fn name(&self) -> &str;

    /// Check if the engine can run at all (binary installed, etc.).
    fn is_available(&self) -> bool;

    /// Describe what is needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Load the engine.
    async fn load(&mut self) -> Result<(), OcrError>;

    /// Make sure data for `language` is present.
    async fn load_language(&mut self, language: &str) -> Result<(), OcrError>;

    /// Select `language` for subsequent recognition.
    async fn initialize(&mut self, language: &str) -> Result<(), OcrError>;

    /// Run OCR on an image file.
    ///
    /// Dropping the returned future must abandon the work.
    async fn ocr_image(&self, image_path: &Path) -> Result<OcrResult, OcrError>;
}

/// Configuration for OCR backends.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Language for OCR (e.g., "eng", "eng+deu").
    pub language: String,
    /// Path or name of the tesseract executable.
    pub tesseract_binary: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tesseract_binary: PathBuf::from("tesseract"),
        }
    }
}

/// Construct a backend of the given type.
pub fn create_backend(backend_type: OcrBackendType, config: &OcrConfig) -> Box<dyn OcrBackend> {
    match backend_type {
        OcrBackendType::Tesseract => Box::new(super::TesseractBackend::with_config(config.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_round_trip() {
        assert_eq!(OcrBackendType::from_str("Tesseract"), Some(OcrBackendType::Tesseract));
        assert_eq!(OcrBackendType::from_str("ocrs"), None);
        assert_eq!(OcrBackendType::Tesseract.to_string(), "tesseract");
    }
}
