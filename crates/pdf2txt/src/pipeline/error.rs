use thiserror::Error;

/// Failures that end a job in `error`. The display text becomes the job's
/// error message and the failure payload's `error` field.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Processing(#[from] crate::error::ProcessError),

    #[error("Failed to store result: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Failed to issue download token: {0}")]
    Token(#[from] crate::token::TokenError),

    #[error("Job has no source file")]
    NoSourceFile,

    #[error("Owner {0} not found")]
    OwnerNotFound(i64),

    /// A newer submission replaced this attempt; nothing is recorded.
    #[error("Job attempt was superseded by a newer submission")]
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    ExtractionDegraded,
    CorrectionSkipped { reason: String },
    CorrectionFailed { error: String },
}
