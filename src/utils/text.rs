//! Normalization of OCR output before it is written to disk.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How recognized text is cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TextNormalization {
    /// Drop blank lines and whitespace before the first content.
    #[default]
    Leading,
    /// Additionally drop every whitespace-only line in the text.
    AllBlankLines,
}

impl TextNormalization {
    pub fn apply(&self, text: &str) -> String {
        match self {
            TextNormalization::Leading => strip_leading_blank_lines(text).to_string(),
            TextNormalization::AllBlankLines => {
                remove_blank_lines(strip_leading_blank_lines(text))
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextNormalization::Leading => "leading",
            TextNormalization::AllBlankLines => "all_blank_lines",
        }
    }
}

/// Remove whitespace-only lines at the start of the text, along with the
/// indentation of the first line that has content.
pub fn strip_leading_blank_lines(text: &str) -> &str {
    text.trim_start()
}

fn blank_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Whitespace-only line including its terminator.
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t\f\v]*\r?\n").expect("valid regex"))
}

/// Remove every whitespace-only line.
pub fn remove_blank_lines(text: &str) -> String {
    let cleaned = blank_line_regex().replace_all(text, "");
    // A trailing line without terminator is dropped if it is blank.
    match cleaned.rfind('\n') {
        Some(idx) if cleaned[idx + 1..].trim().is_empty() => cleaned[..=idx].to_string(),
        _ => cleaned.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_blank_lines_removed() {
        assert_eq!(
            TextNormalization::Leading.apply("\n\n  Hello\nWorld"),
            "Hello\nWorld"
        );
    }

    #[test]
    fn test_leading_keeps_inner_blank_lines() {
        assert_eq!(
            TextNormalization::Leading.apply(" \r\n\t\n>be me\n\n>mfw\n"),
            ">be me\n\n>mfw\n"
        );
    }

    #[test]
    fn test_leading_on_blank_text() {
        assert_eq!(TextNormalization::Leading.apply("\n \n\t"), "");
        assert_eq!(TextNormalization::Leading.apply(""), "");
    }

    #[test]
    fn test_all_blank_lines_removed() {
        assert_eq!(
            TextNormalization::AllBlankLines.apply("\n>be me\n   \n\n>mfw\n  \n"),
            ">be me\n>mfw\n"
        );
    }

    #[test]
    fn test_all_blank_lines_keeps_crlf_content() {
        assert_eq!(
            TextNormalization::AllBlankLines.apply("a\r\n\r\nb"),
            "a\r\nb"
        );
    }
}
