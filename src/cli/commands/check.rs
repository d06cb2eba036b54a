//! OCR environment check.

use console::style;

use crate::cli::icons::{arrow, error, success};
use crate::config::Settings;
use crate::ocr::{OcrBackend, TesseractBackend};

/// Report whether Tesseract and the configured language data are installed.
pub async fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    println!("{}", style("OCR Backend Check").bold());
    println!("{}", "-".repeat(40));

    let backend = TesseractBackend::with_config(settings.ocr_config());
    if !backend.is_available() {
        println!(
            "{} {}: {}",
            error(),
            backend.name(),
            backend.availability_hint()
        );
        anyhow::bail!("tesseract is not installed");
    }
    println!(
        "{} {} ({})",
        success(),
        backend.name(),
        settings.tesseract_binary.display()
    );

    let installed = backend.list_languages().await?;
    println!("  {} Installed languages: {}", arrow(), installed.join(", "));

    let missing: Vec<&str> = settings
        .language
        .split('+')
        .filter(|lang| !installed.iter().any(|i| i == lang))
        .collect();
    if missing.is_empty() {
        println!("{} Language '{}' available", success(), settings.language);
        Ok(())
    } else {
        println!(
            "{} Language data missing: {} (install tesseract-ocr-{})",
            error(),
            missing.join(", "),
            missing[0]
        );
        anyhow::bail!("language '{}' is not installed", settings.language)
    }
}
