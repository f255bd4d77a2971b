//! Entry points for the API layer: submit a document, list jobs, download a
//! result.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::db::job_repo::{self, NewJob};
use crate::db::activity_repo::{self, ActivityRow};
use crate::db::{settings_repo, user_repo, Database, DatabaseError};
use crate::error::{Result, StorageError, WorkerError};
use crate::notify::Notifier;
use crate::pipeline::Pipeline;
use crate::storage::{remove_source, ResultStore};
use crate::token::{TokenError, TokenIssuer};
use crate::worker::{JobId, JobOutcome, JobStatus, WorkerPool};

pub const MIN_LABEL_CHARS: usize = 3;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A document submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub owner_id: i64,
    pub external_label: String,
    pub webhook_url: String,
    pub correction_requested: bool,
    pub source_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub external_label: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub filename: String,
    pub media_type: &'static str,
}

pub struct ExtractionService {
    db: Database,
    tokens: TokenIssuer,
    store: ResultStore,
    pool: WorkerPool,
    notifier: Option<Notifier>,
    submissions: Mutex<()>,
}

impl ExtractionService {
    /// Opens the store, prepares the data directories and starts the workers.
    pub fn start(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database_file())?;
        let pipeline = Arc::new(Pipeline::from_config(config, db)?);
        for dir in [config.users_directory(), config.temp_directory()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| StorageError::CreateDirectory { path: dir, source: e })?;
        }

        let mut service = Self::with_pipeline(pipeline, config.worker_count)?;
        service.notifier = Some(Notifier::new(&config.notifications)?);
        log::info!("Extraction service started with {} workers", config.worker_count);
        Ok(service)
    }

    pub fn with_pipeline(
        pipeline: Arc<Pipeline>,
        worker_count: usize,
    ) -> std::result::Result<Self, ServiceError> {
        let db = pipeline.database().clone();
        let tokens = pipeline.tokens().clone();
        let store = pipeline.store().clone();
        let pool = WorkerPool::new(pipeline, worker_count)?;

        Ok(Self {
            db,
            tokens,
            store,
            pool,
            notifier: None,
            submissions: Mutex::new(()),
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Creates a user and, when `validate` is set, assigns its directory.
    pub async fn register_user(
        &self,
        email: &str,
        validate: bool,
    ) -> std::result::Result<user_repo::UserRow, ServiceError> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(ServiceError::Validation(format!(
                "'{}' is not an email address",
                email
            )));
        }
        if user_repo::find_by_email(&self.db, email)?.is_some() {
            return Err(ServiceError::Validation(format!(
                "User {} already exists",
                email
            )));
        }

        let id = user_repo::insert(&self.db, email, &Utc::now())?;
        if validate {
            self.validate_user(id)?;
        }
        self.notify_operator(&format!("New user registered: {}", email))
            .await;

        user_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))
    }

    /// Marks a user validated and creates its result directory.
    pub fn validate_user(&self, user_id: i64) -> std::result::Result<String, ServiceError> {
        let user = user_repo::find_by_id(&self.db, user_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", user_id)))?;
        let directory = user
            .directory_name
            .unwrap_or_else(|| user_repo::directory_name_for(&user.email));

        if !user.is_validated {
            user_repo::validate(&self.db, user_id, &directory)?;
            activity_repo::record(
                &self.db,
                user_id,
                &format!("user {} validated", user.email),
                &Utc::now(),
            )?;
        }
        self.store.ensure_owner_directory(&directory)?;
        Ok(directory)
    }

    /// Copies an uploaded PDF into the temp directory for [`submit`](Self::submit).
    pub fn stage_upload(
        &self,
        filename: &str,
        content: &[u8],
    ) -> std::result::Result<PathBuf, ServiceError> {
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ServiceError::Validation(
                "Only PDF files are allowed".to_string(),
            ));
        }
        Ok(self.store.stage_upload(filename, content)?)
    }

    /// Records a `pending` job and queues it.
    ///
    /// A label the owner already used is re-submitted in place: the existing
    /// record is reset rather than duplicated.
    pub fn submit(&self, submission: Submission) -> std::result::Result<JobId, ServiceError> {
        if submission.external_label.chars().count() < MIN_LABEL_CHARS {
            return Err(ServiceError::Validation(format!(
                "Label must be at least {} characters",
                MIN_LABEL_CHARS
            )));
        }
        if submission.webhook_url.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Webhook URL is required".to_string(),
            ));
        }
        if user_repo::find_by_id(&self.db, submission.owner_id)?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "owner {}",
                submission.owner_id
            )));
        }

        let job = NewJob {
            owner_id: submission.owner_id,
            external_label: submission.external_label,
            webhook_url: submission.webhook_url,
            source_file_path: submission.source_file_path,
            correction_requested: submission.correction_requested,
        };

        let job_id = {
            let _guard = self
                .submissions
                .lock()
                .map_err(|_| DatabaseError::LockPoisoned)?;
            match job_repo::find_by_label(&self.db, job.owner_id, &job.external_label)? {
                Some(existing) => {
                    if let Some(stale) = job_repo::resubmit(&self.db, existing.id, &job)? {
                        remove_source(&stale);
                    }
                    activity_repo::record(
                        &self.db,
                        job.owner_id,
                        &format!("extraction re-submitted for '{}'", job.external_label),
                        &Utc::now(),
                    )?;
                    log::info!(
                        "Re-submitted '{}' as job {}",
                        job.external_label,
                        existing.id
                    );
                    existing.id
                }
                None => {
                    let id = job_repo::insert(&self.db, &job, &Utc::now())?;
                    activity_repo::record(
                        &self.db,
                        job.owner_id,
                        &format!("extraction requested for '{}'", job.external_label),
                        &Utc::now(),
                    )?;
                    log::info!("Submitted '{}' as job {}", job.external_label, id);
                    id
                }
            }
        };

        self.pool.submit(job_id)?;
        Ok(job_id)
    }

    /// The user's activity journal, newest first.
    pub fn activity(&self, user_id: i64) -> std::result::Result<Vec<ActivityRow>, ServiceError> {
        Ok(activity_repo::list_for_user(&self.db, user_id)?)
    }

    pub fn list_jobs(&self, owner_id: i64) -> std::result::Result<Vec<JobSummary>, ServiceError> {
        Ok(job_repo::list_by_owner(&self.db, owner_id)?
            .into_iter()
            .map(|job| JobSummary {
                id: job.id,
                external_label: job.external_label,
                status: job.status,
                created_at: job.created_at,
                completed_at: job.completed_at,
                error_message: job.error_message,
            })
            .collect())
    }

    /// Resolves a download request. The query token wins over an
    /// `Authorization: Bearer` header.
    pub fn download(
        &self,
        job_id: JobId,
        query_token: Option<&str>,
        authorization: Option<&str>,
    ) -> std::result::Result<DownloadedFile, ServiceError> {
        let token = query_token
            .filter(|t| !t.is_empty())
            .or_else(|| authorization.and_then(|h| h.strip_prefix("Bearer ")))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::Unauthorized)?;

        let grant = self.tokens.authorize_download(&self.db, job_id, token)?;
        let not_ready = || ServiceError::NotFound("File not found or not ready".to_string());

        let job = job_repo::find_by_id(&self.db, job_id)?
            .filter(|job| grant.permits_owner(job.owner_id))
            .ok_or_else(not_ready)?;
        if job.status != JobStatus::Success {
            return Err(not_ready());
        }
        let path = job
            .result_file_path
            .filter(|path| path.is_file())
            .ok_or_else(not_ready)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DownloadedFile {
            path,
            filename,
            media_type: "text/plain",
        })
    }

    /// Blocks until the outcome of `job_id` is reported or `timeout` elapses.
    ///
    /// Outcomes of other jobs received meanwhile are discarded.
    pub fn wait_for(&self, job_id: JobId, timeout: Duration) -> Option<JobOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let outcome = self.pool.recv_result_timeout(remaining)?;
            if outcome.job_id == job_id {
                return Some(outcome);
            }
        }
    }

    /// Sends `message` to the operator webhook: the stored setting first,
    /// then the configured one.
    pub async fn notify_operator(&self, message: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let stored = settings_repo::load(&self.db)
            .ok()
            .and_then(|settings| settings.discord_webhook);
        notifier.notify_operator(stored.as_deref(), message).await;
    }

    /// Stops accepting work, lets queued jobs finish and joins the workers.
    pub fn close(self) {
        self.pool.wait();
    }
}
