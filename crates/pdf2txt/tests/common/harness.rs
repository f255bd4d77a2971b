//! Isolated pipeline environment for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use tempfile::TempDir;

use pdf2txt::config::schema::default_preamble_patterns;
use pdf2txt::correction::{
    ChunkRequest, ChunkedCorrector, CorrectionBackend, CorrectionError, PreambleStripper,
};
use pdf2txt::db::{user_repo, Database};
use pdf2txt::notify::{Notify, WebhookPayload};
use pdf2txt::{
    ExtractionService, OcrEngine, Pipeline, PipelineConfig, ProcessError, TextExtractor,
    TokenIssuer,
};
use pdf2txt::storage::ResultStore;

use super::builders::build_pdf;

pub const WEBHOOK: &str = "https://client.example.com/hooks/extraction";

/// OCR stand-in: one line of recognized text per page, counting calls.
pub struct ScriptedOcr {
    pub calls: AtomicUsize,
}

impl OcrEngine for ScriptedOcr {
    fn recognize_pdf(&self, path: &Path) -> Result<Vec<String>, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let doc = lopdf::Document::load(path)
            .map_err(|e| ProcessError::PdfProcessing(e.to_string()))?;
        Ok((1..=doc.get_pages().len())
            .map(|page| format!("Page {} numerisee: bail commercial", page))
            .collect())
    }
}

/// Correction stand-in that upper-cases each chunk.
pub struct UppercaseBackend {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CorrectionBackend for UppercaseBackend {
    async fn correct_chunk(
        &self,
        _credential: &SecretString,
        request: &ChunkRequest,
    ) -> Result<String, CorrectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(request.content.to_uppercase())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, WebhookPayload)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, WebhookPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notify for RecordingNotifier {
    async fn notify(&self, url: &str, payload: &WebhookPayload) {
        self.sent
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub ocr: Arc<ScriptedOcr>,
    pub backend: Arc<UppercaseBackend>,
    pub notifier: Arc<RecordingNotifier>,
    pub tokens: TokenIssuer,
    pub store: ResultStore,
    pipeline: Arc<Pipeline>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_in_memory().expect("Failed to open database");
        let ocr = Arc::new(ScriptedOcr {
            calls: AtomicUsize::new(0),
        });
        let backend = Arc::new(UppercaseBackend {
            calls: AtomicUsize::new(0),
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let tokens = TokenIssuer::new(
            &SecretString::from("integration-key"),
            Duration::days(365),
            Duration::minutes(10080),
        );
        let store = ResultStore::new(
            temp_dir.path().join("users"),
            temp_dir.path().join("temp"),
        );

        let config = Arc::new(PipelineConfig {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            correction_credential: Some(SecretString::from("hf_integration")),
        });
        let corrector = ChunkedCorrector::new(
            backend.clone(),
            PreambleStripper::new(&default_preamble_patterns()).unwrap(),
            3000,
        );
        let pipeline = Arc::new(Pipeline::new(
            config,
            db.clone(),
            TextExtractor::new(ocr.clone(), 120),
            corrector,
            tokens.clone(),
            notifier.clone(),
            store.clone(),
        ));

        Self {
            temp_dir,
            db,
            ocr,
            backend,
            notifier,
            tokens,
            store,
            pipeline,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn service(&self, workers: usize) -> ExtractionService {
        ExtractionService::with_pipeline(self.pipeline(), workers)
            .expect("Failed to start service")
    }

    pub fn validated_owner(&self, email: &str) -> i64 {
        let id = user_repo::insert(&self.db, email, &Utc::now()).unwrap();
        user_repo::validate(&self.db, id, &user_repo::directory_name_for(email)).unwrap();
        id
    }

    /// Stages a generated PDF the way an upload would be staged.
    pub fn upload(&self, pages: &[&str]) -> PathBuf {
        self.store
            .stage_upload("document.pdf", &build_pdf(pages))
            .expect("Failed to stage upload")
    }

    pub fn ocr_calls(&self) -> usize {
        self.ocr.calls.load(Ordering::SeqCst)
    }

    pub fn correction_calls(&self) -> usize {
        self.backend.calls.load(Ordering::SeqCst)
    }
}
