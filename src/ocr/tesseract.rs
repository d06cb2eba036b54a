//! Tesseract OCR backend implementation.
//!
//! Runs the `tesseract` command-line tool as a child process per image. The
//! child is killed if the recognition future is dropped, so job deadlines in
//! the scheduler actually stop the work.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use super::backend::{OcrBackend, OcrConfig, OcrError, OcrResult};

/// Check if a binary is available in PATH (or exists, for explicit paths).
pub fn check_binary(binary: &Path) -> bool {
    which::which(binary).is_ok()
}

/// Parse `tesseract --list-langs` output.
///
/// The first line is a header ("List of available languages in ..."), the
/// rest are language codes.
pub fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(|l| l.to_string())
        .collect()
}

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: OcrConfig,
    loaded: bool,
    installed_languages: Vec<String>,
    active_language: Option<String>,
}

impl TesseractBackend {
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    pub fn with_config(config: OcrConfig) -> Self {
        Self {
            config,
            loaded: false,
            installed_languages: Vec::new(),
            active_language: None,
        }
    }

    fn binary(&self) -> &PathBuf {
        &self.config.tesseract_binary
    }

    fn spawn_error(&self, e: std::io::Error) -> OcrError {
        if e.kind() == std::io::ErrorKind::NotFound {
            OcrError::BackendNotAvailable(format!(
                "{} not found (install tesseract-ocr)",
                self.binary().display()
            ))
        } else {
            OcrError::Io(e)
        }
    }

    /// Languages reported by the installed tesseract.
    pub async fn list_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = Command::new(self.binary())
            .arg("--list-langs")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::BackendNotAvailable(format!(
                "tesseract --list-langs failed: {}",
                stderr.trim()
            )));
        }

        // Older tesseract versions print the list on stderr.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let listing = if stdout.trim().is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            stdout.to_string()
        };
        Ok(parse_language_list(&listing))
    }

    async fn run_tesseract(&self, image_path: &Path, language: &str) -> Result<String, OcrError> {
        let output = Command::new(self.binary())
            .arg(image_path)
            .arg("stdout")
            .args(["-l", language])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr.trim())))
        }
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        check_binary(self.binary())
    }

    fn availability_hint(&self) -> String {
        if check_binary(self.binary()) {
            "Tesseract is available".to_string()
        } else {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        }
    }

    async fn load(&mut self) -> Result<(), OcrError> {
        if !self.is_available() {
            return Err(OcrError::BackendNotAvailable(self.availability_hint()));
        }
        self.installed_languages = self.list_languages().await?;
        self.loaded = true;
        Ok(())
    }

    async fn load_language(&mut self, language: &str) -> Result<(), OcrError> {
        if !self.loaded {
            return Err(OcrError::NotInitialized);
        }
        // "eng+deu" needs every component installed.
        let missing: Vec<&str> = language
            .split('+')
            .filter(|l| !self.installed_languages.iter().any(|i| i == l))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OcrError::LanguageNotAvailable(format!(
                "{} (install tesseract-ocr-{})",
                missing.join(", "),
                missing[0]
            )))
        }
    }

    async fn initialize(&mut self, language: &str) -> Result<(), OcrError> {
        if !self.loaded {
            return Err(OcrError::NotInitialized);
        }
        self.active_language = Some(language.to_string());
        Ok(())
    }

    async fn ocr_image(&self, image_path: &Path) -> Result<OcrResult, OcrError> {
        let language = self
            .active_language
            .as_deref()
            .ok_or(OcrError::NotInitialized)?;

        let start = Instant::now();
        let text = self.run_tesseract(image_path, language).await?;

        Ok(OcrResult {
            text,
            confidence: None,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_list() {
        let out = "List of available languages in \"/usr/share/tesseract-ocr/5/tessdata/\" (3):\neng\nosd\ndeu\n";
        assert_eq!(parse_language_list(out), vec!["eng", "osd", "deu"]);
    }

    #[tokio::test]
    async fn test_missing_binary_fails_load() {
        let mut backend = TesseractBackend::with_config(OcrConfig {
            tesseract_binary: PathBuf::from("/nonexistent/bin/tesseract-xyz"),
            ..Default::default()
        });
        assert!(!backend.is_available());
        assert!(matches!(
            backend.load().await,
            Err(OcrError::BackendNotAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_recognize_before_initialize() {
        let backend = TesseractBackend::new();
        let result = backend.ocr_image(Path::new("/tmp/none.png")).await;
        assert!(matches!(result, Err(OcrError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_language_check_requires_load() {
        let mut backend = TesseractBackend::new();
        assert!(matches!(
            backend.load_language("eng").await,
            Err(OcrError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_combined_language_check() {
        let mut backend = TesseractBackend::new();
        backend.loaded = true;
        backend.installed_languages = vec!["eng".to_string(), "osd".to_string()];
        assert!(backend.load_language("eng").await.is_ok());
        assert!(matches!(
            backend.load_language("eng+deu").await,
            Err(OcrError::LanguageNotAvailable(msg)) if msg.starts_with("deu")
        ));
    }
}
