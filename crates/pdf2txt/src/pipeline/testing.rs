//! Fakes and a ready-made pipeline for unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::SecretString;
use tempfile::TempDir;

use crate::correction::{
    ChunkRequest, ChunkedCorrector, CorrectionBackend, CorrectionError, PreambleStripper,
};
use crate::config::schema::default_preamble_patterns;
use crate::db::job_repo::{self, NewJob};
use crate::db::{user_repo, Database};
use crate::error::ProcessError;
use crate::notify::{Notify, WebhookPayload};
use crate::processor::pdf::tests::build_pdf;
use crate::processor::{OcrEngine, TextExtractor};
use crate::storage::ResultStore;
use crate::token::TokenIssuer;
use crate::worker::JobId;

use super::{Pipeline, PipelineConfig};

pub(crate) const WEBHOOK: &str = "https://client.example.com/hook";

type Hook = Box<dyn FnOnce() + Send>;

/// Returns one line per page, or fails when built with `fail`. A queued hook
/// runs once, in the middle of the next recognition.
pub(crate) struct FakeOcr {
    fail: bool,
    during_recognition: Mutex<Option<Hook>>,
}

impl OcrEngine for FakeOcr {
    fn recognize_pdf(&self, path: &Path) -> Result<Vec<String>, ProcessError> {
        if let Some(hook) = self.during_recognition.lock().unwrap().take() {
            hook();
        }
        if self.fail {
            return Err(ProcessError::OcrFailed("tesseract unavailable".to_string()));
        }
        let doc = lopdf::Document::load(path)
            .map_err(|e| ProcessError::PdfProcessing(e.to_string()))?;
        Ok((1..=doc.get_pages().len())
            .map(|page| format!("Texte reconnu page {}", page))
            .collect())
    }
}

/// Upper-cases every chunk, or fails with the configured error kind.
pub(crate) struct FakeBackend {
    pub fail_with_timeout: bool,
    pub calls: Mutex<usize>,
}

#[async_trait]
impl CorrectionBackend for FakeBackend {
    async fn correct_chunk(
        &self,
        _credential: &SecretString,
        request: &ChunkRequest,
    ) -> Result<String, CorrectionError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail_with_timeout {
            return Err(CorrectionError::Timeout);
        }
        Ok(format!("Voici le texte corrigé :\n{}", request.content.to_uppercase()))
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, WebhookPayload)>>,
}

impl RecordingNotifier {
    pub fn payloads(&self) -> Vec<(String, WebhookPayload)> {
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

pub(crate) struct Harness {
    pub dir: TempDir,
    pub db: Database,
    pub notifier: Arc<RecordingNotifier>,
    pub backend: Arc<FakeBackend>,
    pub tokens: TokenIssuer,
    pub store: ResultStore,
    ocr: Arc<FakeOcr>,
    pipeline: Arc<Pipeline>,
}

pub(crate) struct HarnessOptions {
    pub ocr_fails: bool,
    pub correction_times_out: bool,
    pub credential: Option<&'static str>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            ocr_fails: false,
            correction_times_out: false,
            credential: Some("hf_test"),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let backend = Arc::new(FakeBackend {
            fail_with_timeout: options.correction_times_out,
            calls: Mutex::new(0),
        });
        let tokens = TokenIssuer::new(
            &SecretString::from("harness-key"),
            Duration::days(365),
            Duration::minutes(60),
        );
        let store = ResultStore::new(dir.path().join("users"), dir.path().join("temp"));

        let config = Arc::new(PipelineConfig {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            correction_credential: options.credential.map(SecretString::from),
        });
        let ocr = Arc::new(FakeOcr {
            fail: options.ocr_fails,
            during_recognition: Mutex::new(None),
        });
        let extractor = TextExtractor::new(ocr.clone(), 120);
        let corrector = ChunkedCorrector::new(
            backend.clone(),
            PreambleStripper::new(&default_preamble_patterns()).unwrap(),
            3000,
        );

        let pipeline = Arc::new(Pipeline::new(
            config,
            db.clone(),
            extractor,
            corrector,
            tokens.clone(),
            notifier.clone(),
            store.clone(),
        ));

        Self {
            dir,
            db,
            notifier,
            backend,
            tokens,
            store,
            ocr,
            pipeline,
        }
    }

    /// Runs `hook` while the next OCR call is in progress.
    pub fn during_ocr(&self, hook: impl FnOnce() + Send + 'static) {
        *self.ocr.during_recognition.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn source_of(&self, job_id: JobId) -> PathBuf {
        job_repo::find_by_id(&self.db, job_id)
            .unwrap()
            .unwrap()
            .source_file_path
            .unwrap()
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// A validated owner; returns its id.
    pub fn owner(&self, email: &str) -> i64 {
        let id = user_repo::insert(&self.db, email, &Utc::now()).unwrap();
        user_repo::validate(&self.db, id, &user_repo::directory_name_for(email)).unwrap();
        id
    }

    /// Writes a PDF with the given page texts into the temp directory.
    pub fn write_pdf(&self, pages: &[&str]) -> PathBuf {
        self.store.stage_upload("scan.pdf", &build_pdf(pages)).unwrap()
    }

    pub fn new_job(&self, owner_id: i64, label: &str, source: PathBuf, correction: bool) -> NewJob {
        NewJob {
            owner_id,
            external_label: label.to_string(),
            webhook_url: WEBHOOK.to_string(),
            source_file_path: source,
            correction_requested: correction,
        }
    }

    pub fn pending_job(&self, owner_id: i64, label: &str, pages: &[&str]) -> JobId {
        let source = self.write_pdf(pages);
        let job = self.new_job(owner_id, label, source, false);
        job_repo::insert(&self.db, &job, &Utc::now()).unwrap()
    }
}
