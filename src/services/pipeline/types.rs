//! Pipeline types and events.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{ManifestEntry, Post, TimeWindow};
use crate::services::download::{DownloadBatch, DownloadConfig, DownloadEvent};
use crate::services::recognize::RecognizeEvent;
use crate::utils::TextNormalization;

/// Steps of one pipeline cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    /// Request each image and stream it to disk, then join every write
    Download,
    /// Build the manifest from the images on disk
    Write,
    /// Worker pool initialization, first non-empty manifest only
    WarmUp,
    Recognize,
    AdvanceWindow,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Download => "download",
            Stage::Write => "write",
            Stage::WarmUp => "warm-up",
            Stage::Recognize => "recognize",
            Stage::AdvanceWindow => "advance window",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many cycles to run and which time window each one queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// One query for the newest posts.
    Once,
    /// `days` one-day windows, the first ending at `before`, each
    /// following one a day earlier.
    Daily { days: u32, before: DateTime<Utc> },
}

impl Schedule {
    pub fn cycles(&self) -> u32 {
        match self {
            Schedule::Once => 1,
            Schedule::Daily { days, .. } => (*days).max(1),
        }
    }

    pub fn first_window(&self) -> Option<TimeWindow> {
        match self {
            Schedule::Once => None,
            Schedule::Daily { before, .. } => Some(TimeWindow::day_ending_at(*before)),
        }
    }
}

/// Everything the pipeline needs to run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub endpoint: String,
    pub subreddit: String,
    /// Posts requested per query.
    pub size: u32,
    pub schedule: Schedule,
    /// OCR workers to start.
    pub workers: usize,
    pub language: String,
    pub job_timeout: Option<Duration>,
    pub normalization: TextNormalization,
    pub download: DownloadConfig,
}

impl PipelineConfig {
    pub fn resources_dir(&self) -> &PathBuf {
        &self.download.resources_dir
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.download.output_dir
    }
}

/// State of the cycle in progress.
#[derive(Debug)]
pub struct CycleContext {
    pub index: u32,
    pub window: Option<TimeWindow>,
    pub posts: Vec<Post>,
    /// Images on disk between the download and write stages.
    pub batch: Option<DownloadBatch>,
    pub manifest: Vec<ManifestEntry>,
    pub summary: CycleSummary,
}

impl CycleContext {
    pub fn new(index: u32, window: Option<TimeWindow>) -> Self {
        Self {
            index,
            window,
            posts: Vec::new(),
            batch: None,
            manifest: Vec::new(),
            summary: CycleSummary {
                index,
                window,
                ..Default::default()
            },
        }
    }
}

/// Counts for one finished cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub index: u32,
    pub window: Option<TimeWindow>,
    /// Set when the post query failed.
    pub fetch_error: Option<String>,
    pub posts: usize,
    pub skipped: usize,
    pub already_present: usize,
    pub download_failed: usize,
    pub written: usize,
    pub write_failed: usize,
    pub queued: usize,
    pub recognized: usize,
    pub recognition_failed: usize,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub cycles: Vec<CycleSummary>,
    /// Workers started, zero when nothing needed OCR.
    pub workers: usize,
}

impl RunSummary {
    pub fn total_written(&self) -> usize {
        self.cycles.iter().map(|c| c.written).sum()
    }

    pub fn total_recognized(&self) -> usize {
        self.cycles.iter().map(|c| c.recognized).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.cycles
            .iter()
            .map(|c| c.download_failed + c.write_failed + c.recognition_failed)
            .sum()
    }

    pub fn fetch_errors(&self) -> usize {
        self.cycles.iter().filter(|c| c.fetch_error.is_some()).count()
    }
}

/// Events emitted while the pipeline runs.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    CycleStarted {
        index: u32,
        total: u32,
        window: Option<TimeWindow>,
    },
    StageEntered { index: u32, stage: Stage },
    PostsFetched { count: usize },
    FetchFailed { error: String },
    Download(DownloadEvent),
    WarmUpStarted { workers: usize },
    WorkersReady { workers: usize },
    Recognize(RecognizeEvent),
    CycleFinished(CycleSummary),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_schedule_windows() {
        assert_eq!(Schedule::Once.cycles(), 1);
        assert_eq!(Schedule::Once.first_window(), None);

        let before = Utc.with_ymd_and_hms(2021, 3, 10, 0, 0, 0).unwrap();
        let daily = Schedule::Daily { days: 7, before };
        assert_eq!(daily.cycles(), 7);
        let window = daily.first_window().unwrap();
        assert_eq!(window.before, before.timestamp());
        assert_eq!(window.before - window.after, 86_400);
        assert_eq!(window.previous_day().before, window.after);
    }

    #[test]
    fn test_run_summary_totals() {
        let summary = RunSummary {
            cycles: vec![
                CycleSummary {
                    written: 3,
                    recognized: 2,
                    recognition_failed: 1,
                    ..Default::default()
                },
                CycleSummary {
                    fetch_error: Some("HTTP 502".to_string()),
                    download_failed: 1,
                    ..Default::default()
                },
            ],
            workers: 3,
        };
        assert_eq!(summary.total_written(), 3);
        assert_eq!(summary.total_recognized(), 2);
        assert_eq!(summary.total_failed(), 2);
        assert_eq!(summary.fetch_errors(), 1);
    }
}
