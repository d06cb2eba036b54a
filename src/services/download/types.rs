//! Download service types and events.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ImageRef;
use crate::scrapers::BodyStream;

/// Configuration for the image downloader and writer.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory images are written to.
    pub resources_dir: PathBuf,
    /// Directory recognized text is written to. Used for the manifest check.
    pub output_dir: PathBuf,
    /// Hosts images may be downloaded from.
    pub allowed_hosts: Vec<String>,
    /// Maximum number of downloads in flight.
    pub concurrency: usize,
}

impl DownloadConfig {
    pub fn new(resources_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            resources_dir,
            output_dir,
            allowed_hosts: vec!["i.redd.it".to_string()],
            concurrency: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download of {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl DownloadError {
    pub fn url(&self) -> &str {
        match self {
            DownloadError::Request { url, .. } | DownloadError::Status { url, .. } => url,
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("body of {url} broke off: {source}")]
    Stream {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} is not an image (detected {})", detected.unwrap_or("unknown content"))]
    NotAnImage {
        url: String,
        detected: Option<&'static str>,
    },
    #[error("{url} returned an empty body")]
    Empty { url: String },
}

/// Why one selected image did not end up on disk.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

impl WriteError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> WriteError {
        let path = path.into();
        move |source| WriteError::Io { path, source }
    }
}

/// An open image response, streamed to disk by the task that opened it.
pub struct DownloadedImage {
    pub image: ImageRef,
    pub body: BodyStream,
    /// Final location of the image.
    pub path: PathBuf,
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for DownloadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadedImage")
            .field("image", &self.image)
            .field("path", &self.path)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Why a post produced no download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoUrl,
    BadUrl,
    HostNotAllowed,
    Duplicate,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoUrl => "no url",
            SkipReason::BadUrl => "unusable image url",
            SkipReason::HostNotAllowed => "host not allowed",
            SkipReason::Duplicate => "duplicate image stem",
        }
    }
}

/// Events emitted while downloading and writing images.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Selection of images from posts started
    Started { total_posts: usize },
    /// Post produced no download
    PostSkipped { post: String, reason: SkipReason },
    /// Image already on disk, not downloaded again
    AlreadyPresent { name: String },
    /// Response headers received, body being written
    Downloaded {
        name: String,
        content_length: Option<u64>,
    },
    /// Download failed
    DownloadFailed { url: String, error: String },
    /// Image written to disk
    Written { name: String, bytes: u64 },
    /// Image could not be written
    WriteFailed { name: String, error: String },
    /// Manifest built
    ManifestReady { entries: usize },
}

/// Outcome of the download stage for one cycle.
///
/// Every write has finished by the time a batch exists.
#[derive(Debug, Default)]
pub struct DownloadBatch {
    /// Images streamed to disk in this cycle.
    pub written: Vec<ImageRef>,
    /// Images that were already on disk.
    pub existing: Vec<ImageRef>,
    pub skipped: usize,
    pub download_failed: usize,
    pub write_failed: usize,
}

impl DownloadBatch {
    /// Images on disk after this cycle, new ones first.
    pub fn on_disk(&self) -> impl Iterator<Item = &ImageRef> {
        self.written.iter().chain(self.existing.iter())
    }
}
