//! Job scheduler distributing recognition jobs over registered workers.
//!
//! Jobs go into one shared queue. Each registered worker runs in its own
//! task and pulls the next job as soon as it is idle, so no worker holds more
//! than one job at a time. Every job carries a oneshot reply channel; dropping
//! the `JobHandle` cancels the job, and a job that runs past the deadline is
//! abandoned (the tesseract child is killed when its future drops).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backend::{OcrError, OcrResult};
use super::pool::{OcrWorker, WorkerState};

/// Why a recognition job produced no text.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("no OCR workers registered")]
    NoWorkers,

    #[error("scheduler has been terminated")]
    Terminated,

    #[error("OCR of {} timed out after {:?}", path.display(), after)]
    Timeout { path: PathBuf, after: Duration },

    #[error("OCR of {} failed: {source}", path.display())]
    Ocr {
        path: PathBuf,
        #[source]
        source: OcrError,
    },

    #[error("worker stopped before finishing {}", path.display())]
    WorkerLost { path: PathBuf },
}

/// A worker was offered for registration in the wrong state.
#[derive(Debug, Error)]
#[error("worker {worker_id} cannot be registered while {}", state.as_str())]
pub struct RegisterError {
    pub worker_id: usize,
    pub state: WorkerState,
}

type JobReply = Result<OcrResult, RecognitionError>;

struct Job {
    id: u64,
    image_path: PathBuf,
    reply: oneshot::Sender<JobReply>,
}

/// Pending result of a submitted job.
#[must_use = "dropping a JobHandle cancels the job"]
pub struct JobHandle {
    id: u64,
    image_path: PathBuf,
    reply: oneshot::Receiver<JobReply>,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Wait for the job's outcome.
    pub async fn wait(self) -> JobReply {
        match self.reply.await {
            Ok(reply) => reply,
            Err(_) => Err(RecognitionError::WorkerLost {
                path: self.image_path,
            }),
        }
    }
}

/// Shared-queue scheduler over a set of ready OCR workers.
pub struct Scheduler {
    sender: StdMutex<Option<mpsc::UnboundedSender<Job>>>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    worker_count: AtomicUsize,
    next_job_id: AtomicU64,
    job_timeout: Option<Duration>,
}

impl Scheduler {
    /// Create a scheduler. `job_timeout` bounds the time a worker spends on
    /// one job, measured from when the worker picks it up.
    pub fn new(job_timeout: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: StdMutex::new(Some(tx)),
            queue: Arc::new(Mutex::new(rx)),
            workers: StdMutex::new(Vec::new()),
            worker_count: AtomicUsize::new(0),
            next_job_id: AtomicU64::new(0),
            job_timeout,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::SeqCst)
    }

    /// Register a ready worker. It starts taking jobs immediately.
    pub fn add_worker(&self, worker: OcrWorker) -> Result<(), RegisterError> {
        if !worker.is_ready() {
            return Err(RegisterError {
                worker_id: worker.id(),
                state: worker.state(),
            });
        }

        let queue = self.queue.clone();
        let job_timeout = self.job_timeout;
        let handle = tokio::spawn(run_worker(worker, queue, job_timeout));

        lock_recovering(&self.workers, "worker list").push(handle);
        self.worker_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Enqueue a job without waiting for it.
    pub fn submit(&self, image_path: PathBuf) -> Result<JobHandle, RecognitionError> {
        if self.worker_count() == 0 {
            return Err(RecognitionError::NoWorkers);
        }

        let sender = lock_recovering(&self.sender, "job sender")
            .clone()
            .ok_or(RecognitionError::Terminated)?;

        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Job {
                id,
                image_path: image_path.clone(),
                reply: reply_tx,
            })
            .map_err(|_| RecognitionError::Terminated)?;

        debug!("Queued OCR job {} for {}", id, image_path.display());
        Ok(JobHandle {
            id,
            image_path,
            reply: reply_rx,
        })
    }

    /// Submit a job and wait for its text.
    pub async fn add_job(&self, image_path: PathBuf) -> Result<OcrResult, RecognitionError> {
        self.submit(image_path)?.wait().await
    }

    /// Stop accepting jobs and wait for workers to drain the queue.
    pub async fn terminate(&self) {
        lock_recovering(&self.sender, "job sender").take();

        let handles: Vec<JoinHandle<()>> = lock_recovering(&self.workers, "worker list")
            .drain(..)
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("OCR worker task ended abnormally: {}", e);
            }
        }
        self.worker_count.store(0, Ordering::SeqCst);
        debug!("Scheduler terminated");
    }
}

/// Lock a std mutex, taking the data back if a previous holder panicked.
fn lock_recovering<'a, T>(mutex: &'a StdMutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Scheduler {} lock was poisoned, recovering", what);
        poisoned.into_inner()
    })
}

async fn run_worker(
    worker: OcrWorker,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    job_timeout: Option<Duration>,
) {
    loop {
        let job = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(Job {
            id,
            image_path,
            mut reply,
        }) = job
        else {
            break;
        };

        if reply.is_closed() {
            debug!("Skipping cancelled OCR job {}", id);
            continue;
        }

        debug!(
            "Worker {} running job {} ({})",
            worker.id(),
            id,
            image_path.display()
        );

        let recognize = async {
            let result = match job_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, worker.recognize(&image_path)).await {
                        Ok(result) => result,
                        Err(_) => {
                            return Err(RecognitionError::Timeout {
                                path: image_path.clone(),
                                after: limit,
                            })
                        }
                    }
                }
                None => worker.recognize(&image_path).await,
            };
            result.map_err(|source| RecognitionError::Ocr {
                path: image_path.clone(),
                source,
            })
        };

        let outcome = tokio::select! {
            outcome = recognize => Some(outcome),
            _ = reply.closed() => None,
        };

        match outcome {
            Some(outcome) => {
                // The caller may have gone away in the meantime.
                let _ = reply.send(outcome);
            }
            None => debug!("OCR job {} cancelled by caller", id),
        }
    }
    debug!("Worker {} stopped", worker.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::OcrBackend;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    struct SlowBackend {
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OcrBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn availability_hint(&self) -> String {
            String::new()
        }
        async fn load(&mut self) -> Result<(), OcrError> {
            Ok(())
        }
        async fn load_language(&mut self, _language: &str) -> Result<(), OcrError> {
            Ok(())
        }
        async fn initialize(&mut self, _language: &str) -> Result<(), OcrError> {
            Ok(())
        }
        async fn ocr_image(&self, image_path: &Path) -> Result<OcrResult, OcrError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if image_path.to_string_lossy().contains("bad") {
                return Err(OcrError::OcrFailed("unreadable".to_string()));
            }
            Ok(OcrResult {
                text: image_path.display().to_string(),
                confidence: None,
                processing_time_ms: self.delay.as_millis() as u64,
            })
        }
    }

    struct Counters {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    async fn scheduler_with(workers: usize, delay: Duration, timeout: Option<Duration>) -> (Scheduler, Counters) {
        let scheduler = Scheduler::new(timeout);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for id in 0..workers {
            let mut worker = OcrWorker::new(
                id,
                Box::new(SlowBackend {
                    delay,
                    in_flight: in_flight.clone(),
                    peak: peak.clone(),
                }),
            );
            worker.warm_up("eng").await.unwrap();
            scheduler.add_worker(worker).unwrap();
        }
        (scheduler, Counters { in_flight, peak })
    }

    #[tokio::test]
    async fn test_no_workers_rejected() {
        let scheduler = Scheduler::new(None);
        assert!(matches!(
            scheduler.add_job(PathBuf::from("a.png")).await,
            Err(RecognitionError::NoWorkers)
        ));
    }

    #[tokio::test]
    async fn test_unready_worker_refused() {
        let (scheduler, counters) = scheduler_with(0, Duration::ZERO, None).await;
        let worker = OcrWorker::new(
            7,
            Box::new(SlowBackend {
                delay: Duration::ZERO,
                in_flight: counters.in_flight.clone(),
                peak: counters.peak.clone(),
            }),
        );
        let err = scheduler.add_worker(worker).unwrap_err();
        assert_eq!(err.worker_id, 7);
        assert_eq!(err.state, WorkerState::Created);
    }

    #[tokio::test]
    async fn test_more_jobs_than_workers() {
        let (scheduler, counters) = scheduler_with(2, Duration::from_millis(20), None).await;

        let handles: Vec<JobHandle> = (0..5)
            .map(|i| scheduler.submit(PathBuf::from(format!("img{}.png", i))).unwrap())
            .collect();
        let results = futures::future::join_all(handles.into_iter().map(|h| h.wait())).await;

        let texts: HashSet<String> = results.into_iter().map(|r| r.unwrap().text).collect();
        assert_eq!(texts.len(), 5);
        assert!(counters.peak.load(Ordering::SeqCst) <= 2);
        scheduler.terminate().await;
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_others() {
        let (scheduler, _) = scheduler_with(1, Duration::ZERO, None).await;
        let bad = scheduler.submit(PathBuf::from("bad.png")).unwrap();
        let good = scheduler.submit(PathBuf::from("good.png")).unwrap();

        assert!(matches!(bad.wait().await, Err(RecognitionError::Ocr { .. })));
        assert_eq!(good.wait().await.unwrap().text, "good.png");
        scheduler.terminate().await;
    }

    #[tokio::test]
    async fn test_job_timeout() {
        let (scheduler, counters) =
            scheduler_with(1, Duration::from_secs(5), Some(Duration::from_millis(50))).await;
        let result = scheduler.add_job(PathBuf::from("slow.png")).await;
        assert!(matches!(result, Err(RecognitionError::Timeout { .. })));
        assert_eq!(counters.peak.load(Ordering::SeqCst), 1);
        scheduler.terminate().await;
    }

    #[tokio::test]
    async fn test_submit_after_terminate() {
        let (scheduler, _) = scheduler_with(1, Duration::ZERO, None).await;
        scheduler.terminate().await;
        assert!(matches!(
            scheduler.submit(PathBuf::from("a.png")),
            Err(RecognitionError::NoWorkers)
        ));
    }

    #[tokio::test]
    async fn test_poisoned_worker_list_still_tracks_workers() {
        let (scheduler, counters) = scheduler_with(0, Duration::ZERO, None).await;
        std::thread::scope(|s| {
            let holder = s.spawn(|| {
                let _guard = scheduler.workers.lock().unwrap();
                panic!("holder panicked");
            });
            assert!(holder.join().is_err());
        });
        assert!(scheduler.workers.is_poisoned());

        let mut worker = OcrWorker::new(
            0,
            Box::new(SlowBackend {
                delay: Duration::ZERO,
                in_flight: counters.in_flight.clone(),
                peak: counters.peak.clone(),
            }),
        );
        worker.warm_up("eng").await.unwrap();
        scheduler.add_worker(worker).unwrap();

        let tracked = |s: &Scheduler| s.workers.lock().unwrap_or_else(|p| p.into_inner()).len();
        assert_eq!(tracked(&scheduler), 1);
        assert_eq!(
            scheduler.add_job(PathBuf::from("a.png")).await.unwrap().text,
            "a.png"
        );

        scheduler.terminate().await;
        assert_eq!(tracked(&scheduler), 0);
        assert_eq!(scheduler.worker_count(), 0);
    }
}
