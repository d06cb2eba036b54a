//! OCR engine integration.
//!
//! - `backend`: the `OcrBackend` trait every engine implements
//! - `tesseract`: Tesseract via its command-line tool (default)
//! - `pool`: worker lifecycle and pool warm-up
//! - `scheduler`: shared job queue over the ready workers

mod backend;
mod pool;
mod scheduler;
mod tesseract;

pub use backend::{create_backend, OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult};
pub use pool::{BackendFactory, InitializationError, OcrWorker, WorkerPool, WorkerState};
pub use scheduler::{JobHandle, RecognitionError, RegisterError, Scheduler};
pub use tesseract::{check_binary, parse_language_list, TesseractBackend};
