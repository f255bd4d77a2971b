pub mod config;
pub mod correction;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod secrets;
pub mod service;
pub mod storage;
pub mod token;
pub mod worker;

pub use config::{load_config, Config};
pub use correction::{ChunkedCorrector, CorrectionBackend, CorrectionError, HttpCorrectionBackend};
pub use db::Database;
pub use error::{ConfigError, Pdf2TxtError, ProcessError, Result, StorageError, WorkerError};
pub use notify::{Notifier, Notify, WebhookPayload};
pub use pipeline::{Pipeline, PipelineConfig};
pub use processor::{OcrEngine, TesseractOcr, TextExtractor};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use service::{DownloadedFile, ExtractionService, JobSummary, ServiceError, Submission};
pub use token::{TokenError, TokenIssuer};
pub use worker::{JobId, JobOutcome, JobStatus, WorkerPool};
