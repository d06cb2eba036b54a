//! Image references derived from post URLs.

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Extensions accepted as downloadable images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// Why a URL could not be turned into an image reference.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("URL has no file name in its path: {0}")]
    MissingFileName(String),

    #[error("file name has no extension: {0}")]
    MissingExtension(String),

    #[error("unsupported image extension '{extension}' in {url}")]
    UnsupportedExtension { url: String, extension: String },
}

/// An image attached to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Original URL from the post record.
    pub url: String,
    /// Host of the URL, lower-cased.
    pub host: String,
    /// File name on disk (`stem.extension`).
    pub name: String,
    /// File name without extension; also names the text output.
    pub stem: String,
    pub extension: String,
}

impl ImageRef {
    /// Derive an image reference from a URL of shape `scheme://host/.../<id>.<ext>`.
    ///
    /// Query strings and fragments are ignored. Characters in the stem outside
    /// `[A-Za-z0-9_-]` are replaced with `_` so the name is always a single,
    /// safe path component.
    pub fn from_url(raw: &str) -> Result<Self, DeriveError> {
        let url = Url::parse(raw).map_err(|e| DeriveError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DeriveError::MissingHost(raw.to_string()))?
            .to_lowercase();

        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DeriveError::MissingFileName(raw.to_string()))?;

        let (stem, extension) = file_name
            .rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .ok_or_else(|| DeriveError::MissingExtension(raw.to_string()))?;

        let extension = extension.to_lowercase();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(DeriveError::UnsupportedExtension {
                url: raw.to_string(),
                extension,
            });
        }

        let stem = sanitize_stem(stem);

        Ok(Self {
            url: raw.to_string(),
            host,
            name: format!("{}.{}", stem, extension),
            stem,
            extension,
        })
    }

    /// Whether the image lives on one of the given hosts.
    pub fn is_hosted_on(&self, hosts: &[String]) -> bool {
        hosts.iter().any(|h| h.eq_ignore_ascii_case(&self.host))
    }

    /// Same image stored under another extension.
    pub fn with_extension(&self, extension: &str) -> Self {
        Self {
            name: format!("{}.{}", self.stem, extension),
            extension: extension.to_string(),
            ..self.clone()
        }
    }

    /// Destination of the image file.
    pub fn image_path(&self, resources_dir: &Path) -> PathBuf {
        resources_dir.join(&self.name)
    }

    /// Destination of the recognized text.
    pub fn text_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.txt", self.stem))
    }
}

fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// An image on disk that still needs recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub image_path: PathBuf,
    /// Image file name, used in logs and events.
    pub name: String,
    /// Base name of the text file to write.
    pub stem: String,
}

impl ManifestEntry {
    pub fn new(image: &ImageRef, resources_dir: &Path) -> Self {
        Self {
            image_path: image.image_path(resources_dir),
            name: image.name.clone(),
            stem: image.stem.clone(),
        }
    }

    pub fn text_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.txt", self.stem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_reddit_image() {
        let image = ImageRef::from_url("https://i.redd.it/abc123.jpg").unwrap();
        assert_eq!(image.host, "i.redd.it");
        assert_eq!(image.name, "abc123.jpg");
        assert_eq!(image.stem, "abc123");
        assert_eq!(image.extension, "jpg");
    }

    #[test]
    fn test_derive_deeper_host_and_path() {
        // Positional splitting on '.' breaks on these; the parser does not.
        let image = ImageRef::from_url("https://preview.cdn.example.co.uk/a/b/x9.v2.PNG?width=640#top").unwrap();
        assert_eq!(image.host, "preview.cdn.example.co.uk");
        assert_eq!(image.name, "x9_v2.png");
        assert_eq!(image.stem, "x9_v2");
    }

    #[test]
    fn test_derive_rejects_bad_shapes() {
        assert!(matches!(
            ImageRef::from_url("not a url"),
            Err(DeriveError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ImageRef::from_url("https://i.redd.it/"),
            Err(DeriveError::MissingFileName(_))
        ));
        assert!(matches!(
            ImageRef::from_url("https://www.reddit.com/r/greentext/comments/xyz"),
            Err(DeriveError::MissingExtension(_))
        ));
        assert!(matches!(
            ImageRef::from_url("https://i.redd.it/.jpg"),
            Err(DeriveError::MissingExtension(_))
        ));
        assert!(matches!(
            ImageRef::from_url("https://v.redd.it/clip.mp4"),
            Err(DeriveError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn test_stem_cannot_escape_directory() {
        let image = ImageRef::from_url("https://i.redd.it/..%2F..%2Fetc.png").unwrap();
        assert!(!image.name.contains('/'));
        assert!(!image.name.contains('%'));
        assert_eq!(image.extension, "png");
    }

    #[test]
    fn test_paths() {
        let image = ImageRef::from_url("https://i.redd.it/abc123.jpg").unwrap();
        assert_eq!(
            image.image_path(Path::new("/tmp/res")),
            PathBuf::from("/tmp/res/abc123.jpg")
        );
        assert_eq!(
            image.text_path(Path::new("/tmp/out")),
            PathBuf::from("/tmp/out/abc123.txt")
        );
        let entry = ManifestEntry::new(&image, Path::new("/tmp/res"));
        assert_eq!(entry.text_path(Path::new("/tmp/out")), image.text_path(Path::new("/tmp/out")));
    }

    #[test]
    fn test_with_extension_keeps_stem() {
        let image = ImageRef::from_url("https://i.redd.it/abc.png").unwrap();
        let jpg = image.with_extension("jpg");
        assert_eq!(jpg.name, "abc.jpg");
        assert_eq!(jpg.stem, image.stem);
        assert_eq!(jpg.url, image.url);
        assert_eq!(jpg.text_path(Path::new("/out")), image.text_path(Path::new("/out")));
    }

    #[test]
    fn test_hosted_on_is_case_insensitive() {
        let image = ImageRef::from_url("https://I.Redd.It/abc.jpg").unwrap();
        assert!(image.is_hosted_on(&["i.redd.it".to_string()]));
        assert!(!image.is_hosted_on(&["imgur.com".to_string()]));
    }
}
