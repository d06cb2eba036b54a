//! Content sniffing for downloaded files.

/// Detect the MIME type of a buffer from its magic bytes.
pub fn sniff_mime(buffer: &[u8]) -> Option<&'static str> {
    infer::get(buffer).map(|kind| kind.mime_type())
}

/// Whether the leading bytes of a body look like an image.
///
/// Hosts sometimes answer an image URL with an HTML placeholder page, which
/// would otherwise be saved under an image name and fed to OCR.
pub fn looks_like_image(buffer: &[u8]) -> bool {
    infer::is_image(buffer)
}
