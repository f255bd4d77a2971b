use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info_span, Instrument};

use crate::config::Config;
use crate::correction::ChunkedCorrector;
use crate::db::{job_repo, settings_repo, user_repo, Database};
use crate::error::{Pdf2TxtError, Result};
use crate::notify::{Notifier, Notify, WebhookPayload};
use crate::processor::{ExtractionMethod, TextExtractor};
use crate::sanitize::redact_url;
use crate::storage::{discard_result, remove_source, ResultStore};
use crate::token::TokenIssuer;
use crate::worker::{JobId, JobOutcome, JobStatus};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::locks::LabelLocks;

/// Drives one job from `pending` to `success` or `error`.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    db: Database,
    extractor: TextExtractor,
    corrector: ChunkedCorrector,
    tokens: TokenIssuer,
    notifier: Arc<dyn Notify>,
    store: ResultStore,
    locks: LabelLocks,
}

impl Pipeline {
    /// Production constructor, building every component from `config`.
    pub fn from_config(config: &Config, db: Database) -> Result<Self> {
        let pipeline_config = Arc::new(PipelineConfig::from_config(config)?);
        let notifier = Notifier::new(&config.notifications).map_err(Pdf2TxtError::Webhook)?;

        Ok(Self::new(
            pipeline_config,
            db,
            TextExtractor::from_config(&config.ocr),
            ChunkedCorrector::from_config(&config.correction)?,
            TokenIssuer::from_config(&config.tokens)?,
            Arc::new(notifier),
            ResultStore::new(config.users_directory(), config.temp_directory()),
        ))
    }

    pub fn new(
        config: Arc<PipelineConfig>,
        db: Database,
        extractor: TextExtractor,
        corrector: ChunkedCorrector,
        tokens: TokenIssuer,
        notifier: Arc<dyn Notify>,
        store: ResultStore,
    ) -> Self {
        Self {
            config,
            db,
            extractor,
            corrector,
            tokens,
            notifier,
            store,
            locks: LabelLocks::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Runs the job to a terminal state.
    ///
    /// Returns `None` when there was nothing to do: the id is unknown, the job
    /// is no longer pending, or a newer submission replaced this attempt.
    pub async fn run(&self, job_id: JobId) -> Option<JobOutcome> {
        self.run_job(job_id)
            .instrument(info_span!("pipeline", job_id))
            .await
    }

    async fn run_job(&self, job_id: JobId) -> Option<JobOutcome> {
        let job = match job_repo::find_by_id(&self.db, job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                log::warn!("Job {} not found, skipping", job_id);
                return None;
            }
            Err(e) => {
                log::error!("Failed to load job {}: {}", job_id, e);
                return None;
            }
        };

        let _guard = self.locks.lock(job.owner_id, &job.external_label).await;

        // Re-read under the lock: an earlier run or a re-submission may have
        // changed the row while we waited.
        let job = match job_repo::find_by_id(&self.db, job_id) {
            Ok(Some(job)) if job.status == JobStatus::Pending => job,
            Ok(Some(job)) => {
                log::info!("Job {} is {}, nothing to run", job_id, job.status);
                return None;
            }
            Ok(None) => {
                log::warn!("Job {} disappeared, skipping", job_id);
                return None;
            }
            Err(e) => {
                log::error!("Failed to reload job {}: {}", job_id, e);
                return None;
            }
        };

        match job_repo::mark_processing(&self.db, job.id, job.attempt) {
            Ok(true) => {}
            Ok(false) => {
                log::info!("Job {} was picked up elsewhere, skipping", job_id);
                return None;
            }
            Err(e) => {
                log::error!("Failed to start job {}: {}", job_id, e);
                return None;
            }
        }
        log::info!(
            "Processing job {} ('{}', attempt {})",
            job.id,
            job.external_label,
            job.attempt
        );

        let mut ctx = PipelineContext::new(job);
        let outcome = match self.process(&mut ctx).await {
            Ok(payload) => {
                self.notify(&ctx, &payload).await;
                let path = ctx.result_path.clone().unwrap_or_default();
                let method = ctx.method.unwrap_or(ExtractionMethod::Native);
                Some(JobOutcome::success(
                    ctx.job.id,
                    &ctx.job.external_label,
                    path,
                    method,
                    ctx.corrected,
                ))
            }
            Err(PipelineError::Superseded) => {
                log::warn!("Job {} attempt {} was superseded", ctx.job.id, ctx.job.attempt);
                if let Some(stale) = &ctx.result_path {
                    discard_result(stale);
                }
                None
            }
            Err(e) => self.fail(&ctx, e).await,
        };

        for warning in &ctx.warnings {
            log::warn!("Job {} finished with warning: {:?}", ctx.job.id, warning);
        }

        self.cleanup(&ctx);
        outcome
    }

    async fn process(
        &self,
        ctx: &mut PipelineContext,
    ) -> std::result::Result<WebhookPayload, PipelineError> {
        {
            let _step = info_span!("extract").entered();
            self.step_extract(ctx)?;
        }

        self.step_correct(ctx)
            .instrument(info_span!("correct"))
            .await;

        let (path, finished_at) = {
            let _step = info_span!("store").entered();
            self.step_store(ctx)?
        };

        let _step = info_span!("finalize").entered();
        self.step_finalize(ctx, &path, &finished_at)
    }

    fn step_extract(&self, ctx: &mut PipelineContext) -> std::result::Result<(), PipelineError> {
        let source = ctx
            .job
            .source_file_path
            .as_deref()
            .ok_or(PipelineError::NoSourceFile)?;
        let extraction = self.extractor.extract_with_method(source)?;

        if extraction.method == ExtractionMethod::Degraded {
            ctx.warnings.push(PipelineWarning::ExtractionDegraded);
        }
        log::info!(
            "Extracted {} chars ({:?})",
            extraction.text.chars().count(),
            extraction.method
        );
        ctx.method = Some(extraction.method);
        ctx.text = extraction.text;
        Ok(())
    }

    /// Correction never fails the job; problems keep the uncorrected text.
    async fn step_correct(&self, ctx: &mut PipelineContext) {
        if !ctx.job.correction_requested {
            return;
        }
        if ctx.text.trim().is_empty() {
            ctx.warnings.push(PipelineWarning::CorrectionSkipped {
                reason: "no text extracted".to_string(),
            });
            return;
        }
        let Some(credential) = self.correction_credential() else {
            log::warn!("Correction requested but no credential is configured");
            ctx.warnings.push(PipelineWarning::CorrectionSkipped {
                reason: "no credential".to_string(),
            });
            return;
        };

        match self.corrector.correct(&ctx.text, &credential).await {
            Ok(corrected) => {
                ctx.text = corrected;
                ctx.corrected = true;
            }
            Err(e) => {
                log::warn!("Correction failed, keeping extracted text: {}", e);
                ctx.warnings.push(PipelineWarning::CorrectionFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    fn step_store(
        &self,
        ctx: &mut PipelineContext,
    ) -> std::result::Result<(PathBuf, DateTime<Utc>), PipelineError> {
        let owner = user_repo::find_by_id(&self.db, ctx.job.owner_id)?
            .ok_or(PipelineError::OwnerNotFound(ctx.job.owner_id))?;
        let directory = owner
            .directory_name
            .clone()
            .unwrap_or_else(|| user_repo::directory_name_for(&owner.email));

        let finished_at = Utc::now();
        let path = self.store.store_result(
            &directory,
            &ctx.job.external_label,
            &finished_at,
            &ctx.text,
        )?;
        log::info!("Stored result as {}", crate::sanitize::redact_path(&path));

        ctx.result_path = Some(path.clone());
        Ok((path, finished_at))
    }

    /// Builds the success payload, then records `success`. The token is
    /// issued first so a signing failure still ends the job in `error`.
    fn step_finalize(
        &self,
        ctx: &PipelineContext,
        path: &Path,
        finished_at: &DateTime<Utc>,
    ) -> std::result::Result<WebhookPayload, PipelineError> {
        let token = self.tokens.issue_download(ctx.job.id)?;
        let url = self.config.download_url(ctx.job.id, &token);
        let payload = WebhookPayload::succeeded(&ctx.job.external_label, url, &ctx.text);

        if !job_repo::mark_success(&self.db, ctx.job.id, ctx.job.attempt, path, finished_at)? {
            return Err(PipelineError::Superseded);
        }
        log::info!(
            "Job {} succeeded ({:?}, corrected: {})",
            ctx.job.id,
            ctx.method,
            ctx.corrected
        );
        Ok(payload)
    }

    async fn fail(&self, ctx: &PipelineContext, error: PipelineError) -> Option<JobOutcome> {
        let message = error.to_string();
        log::error!("Job {} failed: {}", ctx.job.id, message);

        match job_repo::mark_error(
            &self.db,
            ctx.job.id,
            ctx.job.attempt,
            &message,
            &Utc::now(),
        ) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("Job {} attempt {} was superseded", ctx.job.id, ctx.job.attempt);
                return None;
            }
            Err(e) => log::error!("Failed to record failure of job {}: {}", ctx.job.id, e),
        }

        let payload = WebhookPayload::failed(&ctx.job.external_label, &message);
        self.notify(ctx, &payload).await;
        Some(JobOutcome::failure(ctx.job.id, &ctx.job.external_label, message))
    }

    async fn notify(&self, ctx: &PipelineContext, payload: &WebhookPayload) {
        let url = &ctx.job.webhook_url;
        self.notifier
            .notify(url, payload)
            .instrument(info_span!("notify", target = %redact_url(url)))
            .await;
    }

    /// Deletes the attempt's source file. When a re-submission reused the same
    /// path, the file belongs to the newer attempt and is left alone.
    fn cleanup(&self, ctx: &PipelineContext) {
        let Some(source) = ctx.job.source_file_path.as_deref() else {
            return;
        };
        if self.reused_by_newer_attempt(ctx, source) {
            log::debug!("Source file now belongs to a newer attempt, keeping it");
            return;
        }
        remove_source(source);
    }

    fn reused_by_newer_attempt(&self, ctx: &PipelineContext, source: &Path) -> bool {
        match job_repo::find_by_id(&self.db, ctx.job.id) {
            Ok(Some(current)) => {
                current.attempt != ctx.job.attempt
                    && current.source_file_path.as_deref() == Some(source)
            }
            _ => false,
        }
    }

    /// The stored setting wins over the configured secret.
    fn correction_credential(&self) -> Option<SecretString> {
        match settings_repo::correction_token(&self.db) {
            Ok(Some(token)) => return Some(token),
            Ok(None) => {}
            Err(e) => log::warn!("Failed to read stored correction credential: {}", e),
        }
        self.config
            .correction_credential
            .as_ref()
            .map(|secret| SecretString::from(secret.expose_secret().to_string()))
    }
}
