//! Recognition dispatch: sends manifest images to the scheduler and writes
//! the recognized text.

use std::path::PathBuf;

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::download::WriteError;
use crate::models::{ManifestEntry, Recognition};
use crate::ocr::{OcrResult, RecognitionError, Scheduler};
use crate::utils::TextNormalization;

/// Events emitted during recognition.
#[derive(Debug, Clone)]
pub enum RecognizeEvent {
    /// All jobs submitted
    Started { total: usize },
    /// Text written for an image
    Completed {
        name: String,
        chars: usize,
        processing_time_ms: u64,
    },
    /// No text for an image
    Failed { name: String, error: String },
    /// Every job settled
    Finished { succeeded: usize, failed: usize },
}

/// Failure of one recognition job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Result of recognizing one manifest.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecognizeResult {
    pub succeeded: usize,
    pub failed: usize,
}

/// Fans manifest entries out to the scheduler and collects the text.
pub struct RecognitionDispatcher {
    output_dir: PathBuf,
    normalization: TextNormalization,
}

impl RecognitionDispatcher {
    pub fn new(output_dir: PathBuf, normalization: TextNormalization) -> Self {
        Self {
            output_dir,
            normalization,
        }
    }

    /// Recognize every entry of `manifest`.
    ///
    /// All jobs are submitted before any result is awaited. Failures are
    /// logged per image and do not affect the other jobs.
    pub async fn recognize(
        &self,
        scheduler: &Scheduler,
        manifest: &[ManifestEntry],
        event_tx: mpsc::Sender<RecognizeEvent>,
    ) -> RecognizeResult {
        let mut result = RecognizeResult::default();
        if manifest.is_empty() {
            return result;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!(
                "Cannot create output directory {}: {}",
                self.output_dir.display(),
                e
            );
        }

        let mut pending = FuturesUnordered::new();
        for entry in manifest {
            match scheduler.submit(entry.image_path.clone()) {
                Ok(handle) => pending.push(async move {
                    let outcome = match handle.wait().await {
                        Ok(ocr) => self.persist(entry, ocr).await,
                        Err(e) => Err(JobError::from(e)),
                    };
                    (entry, outcome)
                }),
                Err(e) => {
                    warn!("Could not queue {}: {}", entry.name, e);
                    result.failed += 1;
                    let _ = event_tx
                        .send(RecognizeEvent::Failed {
                            name: entry.name.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        let _ = event_tx
            .send(RecognizeEvent::Started {
                total: pending.len(),
            })
            .await;

        while let Some((entry, outcome)) = pending.next().await {
            match outcome {
                Ok(recognition) => {
                    result.succeeded += 1;
                    let _ = event_tx
                        .send(RecognizeEvent::Completed {
                            name: entry.name.clone(),
                            chars: recognition.text.chars().count(),
                            processing_time_ms: recognition.processing_time_ms,
                        })
                        .await;
                }
                Err(e) => {
                    warn!("No text for {}: {}", entry.name, e);
                    result.failed += 1;
                    let _ = event_tx
                        .send(RecognizeEvent::Failed {
                            name: entry.name.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        info!(
            "Recognized {} image(s), {} failed",
            result.succeeded, result.failed
        );
        let _ = event_tx
            .send(RecognizeEvent::Finished {
                succeeded: result.succeeded,
                failed: result.failed,
            })
            .await;

        result
    }

    /// Normalize and write the text for one image.
    async fn persist(&self, entry: &ManifestEntry, ocr: OcrResult) -> Result<Recognition, JobError> {
        let recognition = Recognition {
            image_name: entry.name.clone(),
            text: ocr.text,
            confidence: ocr.confidence,
            processing_time_ms: ocr.processing_time_ms,
        };
        let text = recognition.normalized_text(self.normalization);

        let path = entry.text_path(&self.output_dir);
        tokio::fs::write(&path, text.as_bytes())
            .await
            .map_err(WriteError::io(&path))?;
        debug!("Wrote {}", path.display());

        Ok(Recognition { text, ..recognition })
    }
}
