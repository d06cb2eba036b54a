//! Shared utility functions.
//!
//! - `mime`: magic-byte sniffing of downloaded content
//! - `text`: cleanup of recognized text

mod mime;
mod text;

pub use mime::{looks_like_image, sniff_mime};
pub use text::{remove_blank_lines, strip_leading_blank_lines, TextNormalization};
