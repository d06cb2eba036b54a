//! Persists downloaded images and builds the recognition manifest.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::types::{DownloadBatch, DownloadEvent, DownloadedImage, WriteError};
use crate::models::{ImageRef, ManifestEntry};
use crate::utils::{looks_like_image, sniff_mime};

/// Bytes collected before deciding whether a body is an image.
const SNIFF_LEN: usize = 64;

/// Writes image bodies under the resources directory.
pub struct ImageWriter {
    resources_dir: PathBuf,
    output_dir: PathBuf,
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

impl ImageWriter {
    pub fn new(resources_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            resources_dir,
            output_dir,
        }
    }

    /// Stream one body to disk. Returns the number of bytes written.
    ///
    /// The body goes to `<name>.part` first and is renamed into place once
    /// complete. On any error the partial file is removed.
    pub async fn write_image(&self, download: DownloadedImage) -> Result<u64, WriteError> {
        let DownloadedImage {
            image, body, path, ..
        } = download;
        let part = part_path(&path);

        let result = stream_to_file(&image.url, body, &part).await;
        match result {
            Ok(bytes) => {
                tokio::fs::rename(&part, &path)
                    .await
                    .map_err(WriteError::io(&path))?;
                debug!("Wrote {} ({} bytes)", path.display(), bytes);
                Ok(bytes)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not remove {}: {}", part.display(), rm);
                    }
                }
                Err(e)
            }
        }
    }

    /// Make sure the resources directory exists.
    pub async fn prepare(&self) -> Result<(), WriteError> {
        tokio::fs::create_dir_all(&self.resources_dir)
            .await
            .map_err(WriteError::io(&self.resources_dir))
    }

    /// Build the recognition manifest for everything the batch left on disk.
    pub async fn manifest(
        &self,
        batch: &DownloadBatch,
        event_tx: mpsc::Sender<DownloadEvent>,
    ) -> Vec<ManifestEntry> {
        let on_disk: Vec<ImageRef> = batch.on_disk().cloned().collect();
        let manifest = self.build_manifest(&on_disk).await;
        let _ = event_tx
            .send(DownloadEvent::ManifestReady {
                entries: manifest.len(),
            })
            .await;

        info!(
            "{} of {} image(s) on disk queued for OCR",
            manifest.len(),
            on_disk.len()
        );
        manifest
    }

    /// Manifest entries for images whose text file does not exist yet.
    pub async fn build_manifest(&self, images: &[ImageRef]) -> Vec<ManifestEntry> {
        let mut manifest = Vec::new();
        for image in images {
            let text_path = image.text_path(&self.output_dir);
            if tokio::fs::try_exists(&text_path).await.unwrap_or(false) {
                debug!("{} already recognized", image.name);
                continue;
            }
            manifest.push(ManifestEntry::new(image, &self.resources_dir));
        }
        manifest
    }
}

async fn stream_to_file(
    url: &str,
    mut body: crate::scrapers::BodyStream,
    part: &Path,
) -> Result<u64, WriteError> {
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(WriteError::io(part))?;

    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
    let mut sniffed = false;
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|source| WriteError::Stream {
            url: url.to_string(),
            source,
        })?;

        if sniffed {
            file.write_all(&chunk).await.map_err(WriteError::io(part))?;
        } else {
            head.extend_from_slice(&chunk);
            if head.len() >= SNIFF_LEN {
                check_image(url, &head)?;
                file.write_all(&head).await.map_err(WriteError::io(part))?;
                sniffed = true;
            }
        }
        written += chunk.len() as u64;
    }

    if !sniffed {
        if head.is_empty() {
            return Err(WriteError::Empty {
                url: url.to_string(),
            });
        }
        check_image(url, &head)?;
        file.write_all(&head).await.map_err(WriteError::io(part))?;
    }

    file.flush().await.map_err(WriteError::io(part))?;
    Ok(written)
}

fn check_image(url: &str, head: &[u8]) -> Result<(), WriteError> {
    if looks_like_image(head) {
        Ok(())
    } else {
        Err(WriteError::NotAnImage {
            url: url.to_string(),
            detected: sniff_mime(head),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::BodyStream;

    const PNG: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];

    fn body(chunks: Vec<&'static [u8]>) -> BodyStream {
        Box::pin(futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, reqwest::Error>(bytes::Bytes::from_static(c))),
        ))
    }

    fn download(dir: &Path, url: &str, chunks: Vec<&'static [u8]>) -> DownloadedImage {
        let image = ImageRef::from_url(url).unwrap();
        DownloadedImage {
            path: image.image_path(dir),
            image,
            body: body(chunks),
            content_length: None,
        }
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/r/abc.png")),
            PathBuf::from("/r/abc.png.part")
        );
    }

    #[tokio::test]
    async fn test_write_image_in_small_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        let d = download(
            dir.path(),
            "https://i.redd.it/abc.png",
            vec![&PNG[..4], &PNG[4..], b"rest of the file"],
        );

        let bytes = writer.write_image(d).await.unwrap();
        assert_eq!(bytes, (PNG.len() + 16) as u64);
        assert!(dir.path().join("abc.png").exists());
        assert!(!dir.path().join("abc.png.part").exists());
    }

    #[tokio::test]
    async fn test_html_body_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        let d = download(
            dir.path(),
            "https://i.redd.it/abc.png",
            vec![b"<!DOCTYPE html><html><body>removed</body></html>"],
        );

        let err = writer.write_image(d).await.unwrap_err();
        assert!(matches!(err, WriteError::NotAnImage { .. }));
        assert!(!dir.path().join("abc.png").exists());
        assert!(!dir.path().join("abc.png.part").exists());
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ImageWriter::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        let d = download(dir.path(), "https://i.redd.it/abc.png", vec![]);
        assert!(matches!(
            writer.write_image(d).await,
            Err(WriteError::Empty { .. })
        ));
    }

    #[tokio::test]
    async fn test_prepare_reports_unusable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "a file, not a directory").unwrap();

        let writer = ImageWriter::new(blocker.join("resources"), dir.path().to_path_buf());
        assert!(matches!(writer.prepare().await, Err(WriteError::Io { .. })));

        let writer = ImageWriter::new(dir.path().join("a/b"), dir.path().to_path_buf());
        writer.prepare().await.unwrap();
        assert!(dir.path().join("a/b").is_dir());
    }

    #[tokio::test]
    async fn test_manifest_skips_recognized_images() {
        let resources = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(output.path().join("done.txt"), "old text").unwrap();

        let writer = ImageWriter::new(resources.path().to_path_buf(), output.path().to_path_buf());
        let batch = DownloadBatch {
            written: vec![ImageRef::from_url("https://i.redd.it/new.png").unwrap()],
            existing: vec![
                ImageRef::from_url("https://i.redd.it/done.jpg").unwrap(),
                ImageRef::from_url("https://i.redd.it/pending.jpg").unwrap(),
            ],
            ..Default::default()
        };
        let (tx, mut rx) = mpsc::channel(4);
        let manifest = writer.manifest(&batch, tx).await;

        let mut stems: Vec<&str> = manifest.iter().map(|e| e.stem.as_str()).collect();
        stems.sort();
        assert_eq!(stems, vec!["new", "pending"]);
        assert!(matches!(
            rx.recv().await,
            Some(DownloadEvent::ManifestReady { entries: 2 })
        ));
    }
}
