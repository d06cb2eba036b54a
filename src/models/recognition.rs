//! Recognized text for one image.

use crate::utils::TextNormalization;

#[derive(Debug, Clone)]
pub struct Recognition {
    pub image_name: String,
    pub text: String,
    /// Confidence score (0.0 - 1.0), if the backend reports one.
    pub confidence: Option<f32>,
    pub processing_time_ms: u64,
}

impl Recognition {
    /// Text as it should be persisted.
    pub fn normalized_text(&self, mode: TextNormalization) -> String {
        mode.apply(&self.text)
    }
}
