//! Service layer for the scraping and OCR pipeline.
//!
//! This module contains domain logic separated from UI concerns.
//! Services report progress through event channels.

pub mod download;
pub mod pipeline;
pub mod recognize;

pub use download::{DownloadConfig, DownloadEvent, ImageDownloader, ImageWriter};
pub use pipeline::{Pipeline, PipelineConfig, PipelineEvent, RunSummary, Schedule, Stage};
pub use recognize::{RecognitionDispatcher, RecognizeEvent, RecognizeResult};
