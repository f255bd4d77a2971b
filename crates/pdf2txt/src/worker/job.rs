use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::processor::ExtractionMethod;

/// Store-assigned extraction job identity.
pub type JobId = i64;

/// Lifecycle state of an extraction job.
///
/// `Pending -> Processing -> {Success, Error}`. Only a fresh submission under
/// the same label puts a terminal job back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Terminal result of one orchestration run, reported back by the worker pool.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub external_label: String,
    pub status: JobStatus,
    pub result_path: Option<PathBuf>,
    /// How the text was obtained; `None` when the job failed.
    pub method: Option<ExtractionMethod>,
    pub corrected: bool,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn success(
        job_id: JobId,
        external_label: &str,
        result_path: PathBuf,
        method: ExtractionMethod,
        corrected: bool,
    ) -> Self {
        Self {
            job_id,
            external_label: external_label.to_string(),
            status: JobStatus::Success,
            result_path: Some(result_path),
            method: Some(method),
            corrected,
            error: None,
        }
    }

    pub fn failure(job_id: JobId, external_label: &str, error: String) -> Self {
        Self {
            job_id,
            external_label: external_label.to_string(),
            status: JobStatus::Error,
            result_path: None,
            method: None,
            corrected: false,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}
