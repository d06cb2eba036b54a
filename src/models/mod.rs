//! Data models for reddit-ocr.

mod image;
mod post;
mod recognition;

pub use image::{DeriveError, ImageRef, ManifestEntry, IMAGE_EXTENSIONS};
pub use post::{Post, SearchResponse, TimeWindow};
pub use recognition::Recognition;
