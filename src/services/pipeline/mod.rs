//! Run orchestration.
//!
//! One cycle goes `Fetch -> Download -> Write -> WarmUp -> Recognize`, then
//! either advances the time window for another cycle or finishes. The OCR
//! workers are started on the first cycle that has images to recognize and
//! shared by every later cycle.

mod types;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ocr::{BackendFactory, InitializationError, Scheduler, WorkerPool};
use crate::scrapers::{HttpClient, RedditSearch, SearchQuery};
use crate::services::download::ImageDownloader;
use crate::services::recognize::RecognitionDispatcher;

pub use types::{
    CycleContext, CycleSummary, PipelineConfig, PipelineEvent, RunSummary, Schedule, Stage,
};

/// Relay a stage's events into the pipeline channel.
fn forward<E: Send + 'static>(
    events: &mpsc::Sender<PipelineEvent>,
    wrap: fn(E) -> PipelineEvent,
) -> (mpsc::Sender<E>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<E>(100);
    let events = events.clone();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let _ = events.send(wrap(event)).await;
        }
    });
    (tx, handle)
}

/// Drives fetch, download, write and recognition for every cycle.
pub struct Pipeline {
    config: PipelineConfig,
    search: RedditSearch,
    downloader: ImageDownloader,
    dispatcher: RecognitionDispatcher,
    pool: WorkerPool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, client: HttpClient, factory: BackendFactory) -> Self {
        let search = RedditSearch::new(client.clone());
        let downloader = ImageDownloader::new(client, config.download.clone());
        let dispatcher =
            RecognitionDispatcher::new(config.output_dir().clone(), config.normalization);
        let pool = WorkerPool::new(config.workers, &config.language, factory);

        Self {
            config,
            search,
            downloader,
            dispatcher,
            pool,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every cycle of the schedule.
    ///
    /// Only a worker initialization failure ends the run early; every other
    /// failure is logged, counted and the run moves on.
    pub async fn run(
        &self,
        event_tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<RunSummary, InitializationError> {
        let scheduler = Scheduler::new(self.config.job_timeout);
        let result = self.run_cycles(&scheduler, &event_tx).await;
        scheduler.terminate().await;
        result
    }

    async fn run_cycles(
        &self,
        scheduler: &Scheduler,
        event_tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<RunSummary, InitializationError> {
        let total = self.config.schedule.cycles();
        let mut summary = RunSummary::default();
        let mut ctx = CycleContext::new(0, self.config.schedule.first_window());
        let mut stage = Stage::Fetch;

        let _ = event_tx
            .send(PipelineEvent::CycleStarted {
                index: 0,
                total,
                window: ctx.window,
            })
            .await;

        loop {
            if stage != Stage::Done {
                let _ = event_tx
                    .send(PipelineEvent::StageEntered {
                        index: ctx.index,
                        stage,
                    })
                    .await;
            }
            debug!("Cycle {}: {}", ctx.index + 1, stage);

            stage = match stage {
                Stage::Fetch => {
                    self.fetch(&mut ctx, event_tx).await;
                    Stage::Download
                }
                Stage::Download => {
                    let posts = std::mem::take(&mut ctx.posts);
                    let (tx, relay) = forward(event_tx, PipelineEvent::Download);
                    let batch = self.downloader.download(&posts, tx).await;
                    let _ = relay.await;

                    ctx.summary.skipped = batch.skipped;
                    ctx.summary.already_present = batch.existing.len();
                    ctx.summary.download_failed = batch.download_failed;
                    ctx.summary.written = batch.written.len();
                    ctx.summary.write_failed = batch.write_failed;
                    ctx.batch = Some(batch);
                    Stage::Write
                }
                Stage::Write => {
                    let batch = ctx.batch.take().unwrap_or_default();
                    let (tx, relay) = forward(event_tx, PipelineEvent::Download);
                    let manifest = self.downloader.writer().manifest(&batch, tx).await;
                    let _ = relay.await;

                    ctx.summary.queued = manifest.len();
                    ctx.manifest = manifest;

                    if !ctx.manifest.is_empty() && scheduler.worker_count() == 0 {
                        Stage::WarmUp
                    } else {
                        Stage::Recognize
                    }
                }
                Stage::WarmUp => {
                    let workers = self.pool.size();
                    let _ = event_tx
                        .send(PipelineEvent::WarmUpStarted { workers })
                        .await;
                    if let Err(e) = self.pool.warm_up(scheduler).await {
                        error!("Worker initialization failed: {}", e);
                        return Err(e);
                    }
                    summary.workers = workers;
                    let _ = event_tx
                        .send(PipelineEvent::WorkersReady { workers })
                        .await;
                    Stage::Recognize
                }
                Stage::Recognize => {
                    if !ctx.manifest.is_empty() {
                        let (tx, relay) = forward(event_tx, PipelineEvent::Recognize);
                        let result = self
                            .dispatcher
                            .recognize(scheduler, &ctx.manifest, tx)
                            .await;
                        let _ = relay.await;
                        ctx.summary.recognized = result.succeeded;
                        ctx.summary.recognition_failed = result.failed;
                    }

                    info!(
                        "Cycle {}/{} done: {} written, {} recognized",
                        ctx.index + 1,
                        total,
                        ctx.summary.written,
                        ctx.summary.recognized
                    );
                    let _ = event_tx
                        .send(PipelineEvent::CycleFinished(ctx.summary.clone()))
                        .await;
                    summary.cycles.push(ctx.summary.clone());

                    if ctx.index + 1 < total {
                        Stage::AdvanceWindow
                    } else {
                        Stage::Done
                    }
                }
                Stage::AdvanceWindow => {
                    let window = ctx.window.map(|w| w.previous_day());
                    ctx = CycleContext::new(ctx.index + 1, window);
                    let _ = event_tx
                        .send(PipelineEvent::CycleStarted {
                            index: ctx.index,
                            total,
                            window,
                        })
                        .await;
                    Stage::Fetch
                }
                Stage::Done => break,
            };
        }

        Ok(summary)
    }

    async fn fetch(&self, ctx: &mut CycleContext, event_tx: &mpsc::Sender<PipelineEvent>) {
        let mut query = SearchQuery::new(
            &self.config.endpoint,
            &self.config.subreddit,
            self.config.size,
        );
        if let Some(window) = ctx.window {
            query = query.with_window(window);
        }

        match self.search.fetch_posts(&query).await {
            Ok(posts) => {
                ctx.summary.posts = posts.len();
                let _ = event_tx
                    .send(PipelineEvent::PostsFetched { count: posts.len() })
                    .await;
                ctx.posts = posts;
            }
            Err(e) => {
                warn!("Fetching posts failed, continuing with none: {}", e);
                ctx.summary.fetch_error = Some(e.to_string());
                let _ = event_tx
                    .send(PipelineEvent::FetchFailed {
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }
}
