//! Image download service.
//!
//! Turns post records into image files on disk. Each image is requested and
//! streamed to disk by the same bounded task. Separated from UI concerns -
//! emits events for progress tracking.

mod types;
mod writer;

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::models::{ImageRef, Post, IMAGE_EXTENSIONS};
use crate::scrapers::HttpClient;

pub use types::{
    DownloadBatch, DownloadConfig, DownloadError, DownloadEvent, DownloadedImage, ImageError,
    SkipReason, WriteError,
};
pub use writer::ImageWriter;

/// Service selecting, downloading and writing post images.
pub struct ImageDownloader {
    client: HttpClient,
    writer: ImageWriter,
    config: DownloadConfig,
}

impl ImageDownloader {
    pub fn new(client: HttpClient, config: DownloadConfig) -> Self {
        let writer = ImageWriter::new(config.resources_dir.clone(), config.output_dir.clone());
        Self {
            client,
            writer,
            config,
        }
    }

    pub fn writer(&self) -> &ImageWriter {
        &self.writer
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Pick the images worth downloading from `posts`.
    ///
    /// Returns the images to fetch and the ones already on disk.
    pub async fn select(
        &self,
        posts: &[Post],
        event_tx: &mpsc::Sender<DownloadEvent>,
    ) -> (Vec<ImageRef>, Vec<ImageRef>, usize) {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        let mut existing = Vec::new();
        let mut skipped = 0;

        for post in posts {
            let reason = match self.classify(post, &mut seen) {
                Ok(image) => {
                    match self.find_on_disk(&image).await {
                        Some(found) => {
                            debug!("{} already downloaded as {}", image.name, found.name);
                            let _ = event_tx
                                .send(DownloadEvent::AlreadyPresent {
                                    name: found.name.clone(),
                                })
                                .await;
                            existing.push(found);
                        }
                        None => pending.push(image),
                    }
                    continue;
                }
                Err(reason) => reason,
            };

            skipped += 1;
            let _ = event_tx
                .send(DownloadEvent::PostSkipped {
                    post: post.label().to_string(),
                    reason,
                })
                .await;
        }

        (pending, existing, skipped)
    }

    /// An image with the same stem already in the resources directory.
    ///
    /// The image's own extension is checked first.
    async fn find_on_disk(&self, image: &ImageRef) -> Option<ImageRef> {
        let others = IMAGE_EXTENSIONS
            .iter()
            .copied()
            .filter(|ext| *ext != image.extension);
        for ext in std::iter::once(image.extension.as_str()).chain(others) {
            let candidate = image.with_extension(ext);
            let path = candidate.image_path(&self.config.resources_dir);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }

    fn classify(&self, post: &Post, seen: &mut HashSet<String>) -> Result<ImageRef, SkipReason> {
        let Some(link) = post.link() else {
            debug!("Post {} has no url", post.label());
            return Err(SkipReason::NoUrl);
        };

        let image = ImageRef::from_url(link).map_err(|e| {
            debug!("Skipping post {}: {}", post.label(), e);
            SkipReason::BadUrl
        })?;

        if !image.is_hosted_on(&self.config.allowed_hosts) {
            debug!("Skipping post {}: host {} not allowed", post.label(), image.host);
            return Err(SkipReason::HostNotAllowed);
        }

        if !seen.insert(image.stem.clone()) {
            debug!("Skipping post {}: duplicate image stem {}", post.label(), image.stem);
            return Err(SkipReason::Duplicate);
        }

        Ok(image)
    }

    /// Open a streaming GET for one image.
    pub async fn fetch(&self, image: ImageRef) -> Result<DownloadedImage, DownloadError> {
        let response = self
            .client
            .get(&image.url)
            .await
            .map_err(|source| DownloadError::Request {
                url: image.url.clone(),
                source,
            })?;

        if !response.is_success() {
            return Err(DownloadError::Status {
                url: image.url.clone(),
                status: response.status.as_u16(),
            });
        }

        let content_length = response.content_length();
        Ok(DownloadedImage {
            path: image.image_path(&self.config.resources_dir),
            image,
            body: response.into_stream(),
            content_length,
        })
    }

    /// Request one image and stream its body to disk.
    async fn download_one(
        &self,
        image: ImageRef,
        event_tx: &mpsc::Sender<DownloadEvent>,
    ) -> (ImageRef, Result<u64, ImageError>) {
        let download = match self.fetch(image.clone()).await {
            Ok(download) => download,
            Err(e) => return (image, Err(e.into())),
        };
        let _ = event_tx
            .send(DownloadEvent::Downloaded {
                name: image.name.clone(),
                content_length: download.content_length,
            })
            .await;

        let result = self.writer.write_image(download).await;
        (image, result.map_err(ImageError::from))
    }

    /// Select, download and write the images attached to `posts`.
    ///
    /// Returns once every write has finished. Failed images are logged and
    /// counted.
    pub async fn download(
        &self,
        posts: &[Post],
        event_tx: mpsc::Sender<DownloadEvent>,
    ) -> DownloadBatch {
        let _ = event_tx
            .send(DownloadEvent::Started {
                total_posts: posts.len(),
            })
            .await;

        let (pending, existing, skipped) = self.select(posts, &event_tx).await;
        let mut batch = DownloadBatch {
            existing,
            skipped,
            ..Default::default()
        };
        if pending.is_empty() {
            return batch;
        }

        if let Err(e) = self.writer.prepare().await {
            error!("Not downloading {} image(s): {}", pending.len(), e);
            batch.write_failed = pending.len();
            let _ = event_tx
                .send(DownloadEvent::WriteFailed {
                    name: self.config.resources_dir.display().to_string(),
                    error: e.to_string(),
                })
                .await;
            return batch;
        }

        let results: Vec<(ImageRef, Result<u64, ImageError>)> = stream::iter(pending)
            .map(|image| self.download_one(image, &event_tx))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (image, result) in results {
            let event = match result {
                Ok(bytes) => {
                    let event = DownloadEvent::Written {
                        name: image.name.clone(),
                        bytes,
                    };
                    batch.written.push(image);
                    event
                }
                Err(ImageError::Download(e)) => {
                    warn!("{}", e);
                    batch.download_failed += 1;
                    DownloadEvent::DownloadFailed {
                        url: e.url().to_string(),
                        error: e.to_string(),
                    }
                }
                Err(ImageError::Write(e)) => {
                    warn!("Could not write {}: {}", image.name, e);
                    batch.write_failed += 1;
                    DownloadEvent::WriteFailed {
                        name: image.name,
                        error: e.to_string(),
                    }
                }
            };
            let _ = event_tx.send(event).await;
        }

        info!(
            "Downloads: {} written, {} failed, {} not written, {} already present, {} posts skipped",
            batch.written.len(),
            batch.download_failed,
            batch.write_failed,
            batch.existing.len(),
            batch.skipped
        );

        batch
    }
}
