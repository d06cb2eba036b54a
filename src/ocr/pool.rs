//! OCR worker handles and pool warm-up.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::backend::{OcrBackend, OcrError, OcrResult};
use super::scheduler::Scheduler;

/// Lifecycle of one OCR worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Loaded,
    LanguageLoaded,
    Ready,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Created => "created",
            WorkerState::Loaded => "loaded",
            WorkerState::LanguageLoaded => "language_loaded",
            WorkerState::Ready => "ready",
        }
    }
}

/// Worker warm-up failed. The whole run stops on this.
#[derive(Debug, Error)]
#[error("OCR worker {worker_id} failed to {step}: {source}")]
pub struct InitializationError {
    pub worker_id: usize,
    pub step: &'static str,
    #[source]
    pub source: OcrError,
}

/// One OCR engine instance plus the lifecycle state it has reached.
pub struct OcrWorker {
    id: usize,
    backend: Box<dyn OcrBackend>,
    state: WorkerState,
}

impl OcrWorker {
    pub fn new(id: usize, backend: Box<dyn OcrBackend>) -> Self {
        Self {
            id,
            backend,
            state: WorkerState::Created,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == WorkerState::Ready
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn out_of_order(&self, step: &'static str) -> InitializationError {
        InitializationError {
            worker_id: self.id,
            step,
            source: OcrError::NotInitialized,
        }
    }

    pub async fn load(&mut self) -> Result<(), InitializationError> {
        if self.state != WorkerState::Created {
            return Err(self.out_of_order("load"));
        }
        self.backend.load().await.map_err(|source| InitializationError {
            worker_id: self.id,
            step: "load",
            source,
        })?;
        self.state = WorkerState::Loaded;
        Ok(())
    }

    pub async fn load_language(&mut self, language: &str) -> Result<(), InitializationError> {
        if self.state != WorkerState::Loaded {
            return Err(self.out_of_order("load language"));
        }
        self.backend
            .load_language(language)
            .await
            .map_err(|source| InitializationError {
                worker_id: self.id,
                step: "load language",
                source,
            })?;
        self.state = WorkerState::LanguageLoaded;
        Ok(())
    }

    pub async fn initialize(&mut self, language: &str) -> Result<(), InitializationError> {
        if self.state != WorkerState::LanguageLoaded {
            return Err(self.out_of_order("initialize"));
        }
        self.backend
            .initialize(language)
            .await
            .map_err(|source| InitializationError {
                worker_id: self.id,
                step: "initialize",
                source,
            })?;
        self.state = WorkerState::Ready;
        Ok(())
    }

    /// Run all three lifecycle steps in order.
    pub async fn warm_up(&mut self, language: &str) -> Result<(), InitializationError> {
        self.load().await?;
        self.load_language(language).await?;
        self.initialize(language).await?;
        debug!("OCR worker {} ready ({})", self.id, self.backend.name());
        Ok(())
    }

    pub async fn recognize(&self, image_path: &Path) -> Result<OcrResult, OcrError> {
        if !self.is_ready() {
            return Err(OcrError::NotInitialized);
        }
        self.backend.ocr_image(image_path).await
    }
}

/// Creates a fresh backend for each worker.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn OcrBackend> + Send + Sync>;

/// Builds the workers a scheduler runs with.
pub struct WorkerPool {
    size: usize,
    language: String,
    factory: BackendFactory,
}

impl WorkerPool {
    pub fn new(size: usize, language: &str, factory: BackendFactory) -> Self {
        Self {
            size: size.max(1),
            language: language.to_string(),
            factory,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Initialize every worker, then register them all with `scheduler`.
    ///
    /// Nothing is registered unless all workers reach `Ready`.
    pub async fn warm_up(&self, scheduler: &Scheduler) -> Result<usize, InitializationError> {
        let mut workers = Vec::with_capacity(self.size);
        for id in 0..self.size {
            let mut worker = OcrWorker::new(id, (self.factory)());
            worker.warm_up(&self.language).await?;
            workers.push(worker);
        }

        for worker in workers {
            // Every worker is Ready here, so registration cannot be refused.
            if let Err(e) = scheduler.add_worker(worker) {
                return Err(InitializationError {
                    worker_id: e.worker_id,
                    step: "register",
                    source: OcrError::NotInitialized,
                });
            }
        }

        info!(
            "{} OCR worker(s) ready (language: {})",
            self.size, self.language
        );
        Ok(self.size)
    }
}
