//! Pipeline run command.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use console::style;
use tokio::sync::mpsc;

use crate::cli::icons::{arrow, error, success, warning};
use crate::cli::progress::RecognitionProgress;
use crate::config::{Preset, Settings};
use crate::services::download::DownloadEvent;
use crate::services::pipeline::{Pipeline, PipelineEvent};
use crate::services::recognize::RecognizeEvent;
use crate::utils::TextNormalization;

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Run preset (single, batch, daily)
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,
    /// Subreddit to search
    #[arg(short, long)]
    pub subreddit: Option<String>,
    /// Posts requested per query
    #[arg(long)]
    pub size: Option<u32>,
    /// OCR workers (0 = one per CPU)
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Days to walk back (daily preset)
    #[arg(long)]
    pub days: Option<u32>,
    /// End of the first window as a UNIX timestamp (daily preset, default: now)
    #[arg(long)]
    pub before: Option<i64>,
    /// Directory for downloaded images
    #[arg(long)]
    pub resources: Option<PathBuf>,
    /// Directory for recognized text
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// OCR language (e.g. eng, eng+deu)
    #[arg(short, long)]
    pub language: Option<String>,
    /// Text cleanup mode
    #[arg(long, value_enum)]
    pub normalization: Option<TextNormalization>,
    /// Show a progress bar during recognition
    #[arg(short = 'P', long)]
    pub progress: bool,
}

impl RunArgs {
    /// Command-line flags take precedence over every other source.
    fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref subreddit) = self.subreddit {
            settings.subreddit = subreddit.clone();
        }
        if let Some(size) = self.size {
            settings.size = size;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(days) = self.days {
            settings.days = days;
        }
        if let Some(ref dir) = self.resources {
            settings.resources_dir = dir.clone();
        }
        if let Some(ref dir) = self.output {
            settings.output_dir = dir.clone();
        }
        if let Some(ref language) = self.language {
            settings.language = language.clone();
        }
        if let Some(mode) = self.normalization {
            settings.normalization = mode;
        }
    }

    fn before(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        match self.before {
            Some(ts) => DateTime::<Utc>::from_timestamp(ts, 0)
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("--before {} is not a valid timestamp", ts)),
            None => Ok(None),
        }
    }
}

/// Run the pipeline.
pub async fn cmd_run(mut settings: Settings, args: RunArgs) -> anyhow::Result<()> {
    args.apply_to_settings(&mut settings);
    settings.ensure_directories()?;

    let config = settings.pipeline_config(args.before()?);
    let client = settings.http_client()?;

    println!(
        "{} r/{} ({} preset, {} posts per query, {} OCR workers, {} cycle(s))",
        style("→").cyan(),
        config.subreddit,
        settings.preset,
        config.size,
        config.workers,
        config.schedule.cycles()
    );

    let pipeline = Pipeline::new(config, client, settings.backend_factory());

    let (event_tx, mut event_rx) = mpsc::channel::<PipelineEvent>(100);
    let show_progress = args.progress;

    // Spawn event handler task (UI layer)
    let event_handler = tokio::spawn(async move {
        let mut progress = RecognitionProgress::new();

        while let Some(event) = event_rx.recv().await {
            match event {
                PipelineEvent::CycleStarted {
                    index,
                    total,
                    window: Some(window),
                } => {
                    println!(
                        "{} Cycle {}/{}: {}",
                        style("→").cyan(),
                        index + 1,
                        total,
                        window
                    );
                }
                PipelineEvent::FetchFailed { error: e } => {
                    progress.println(&format!("{} Fetching posts failed: {}", error(), e));
                }
                PipelineEvent::Download(DownloadEvent::DownloadFailed { url, error: e }) => {
                    progress.println(&format!("{} Failed to download {}: {}", error(), url, e));
                }
                PipelineEvent::Download(DownloadEvent::WriteFailed { name, error: e }) => {
                    progress.println(&format!("{} Failed to write {}: {}", error(), name, e));
                }
                PipelineEvent::WarmUpStarted { workers } => {
                    println!("{} Starting {} OCR workers", arrow(), workers);
                }
                PipelineEvent::Recognize(RecognizeEvent::Started { total }) => {
                    if show_progress {
                        progress.start("recognizing", total);
                    }
                }
                PipelineEvent::Recognize(RecognizeEvent::Completed { .. }) => {
                    progress.inc();
                }
                PipelineEvent::Recognize(RecognizeEvent::Failed { name, error: e }) => {
                    progress.inc();
                    progress.println(&format!("{} No text for {}: {}", error(), name, e));
                }
                PipelineEvent::CycleFinished(_) => {
                    progress.finish();
                }
                _ => {}
            }
        }
        progress.finish();
    });

    let result = pipeline.run(event_tx).await;

    // Wait for event handler to finish
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }

    let summary = result?;

    println!(
        "{} Wrote {} image(s), recognized {}",
        success(),
        summary.total_written(),
        summary.total_recognized()
    );
    let queued: usize = summary.cycles.iter().map(|c| c.queued).sum();
    let present: usize = summary.cycles.iter().map(|c| c.already_present).sum();
    if present > 0 {
        println!(
            "  {} {} image(s) already on disk, {} needed OCR",
            arrow(),
            present,
            queued
        );
    }
    if summary.total_failed() > 0 {
        println!(
            "  {} {} image(s) failed (see log)",
            warning(),
            summary.total_failed()
        );
    }
    if summary.fetch_errors() > 0 {
        println!(
            "  {} {} post search(es) failed",
            warning(),
            summary.fetch_errors()
        );
    }
    println!(
        "  {} Text in {}",
        arrow(),
        settings.output_dir.display()
    );

    Ok(())
}
