use std::path::PathBuf;

use crate::db::job_repo::JobRow;
use crate::processor::ExtractionMethod;

use super::error::PipelineWarning;

/// State accumulated while one job attempt moves through the steps.
pub struct PipelineContext {
    pub job: JobRow,

    // Set by the extract step
    pub text: String,
    pub method: Option<ExtractionMethod>,

    pub corrected: bool,

    // Set by the store step
    pub result_path: Option<PathBuf>,

    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job: JobRow) -> Self {
        Self {
            job,
            text: String::new(),
            method: None,
            corrected: false,
            result_path: None,
            warnings: Vec::new(),
        }
    }
}
