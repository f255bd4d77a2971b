//! Optional language correction of extracted text through a remote
//! instruction-following model.

pub mod backend;
pub mod chunk;
pub mod corrector;
pub mod preamble;

use thiserror::Error;

pub use backend::{ChunkRequest, CorrectionBackend, HttpCorrectionBackend, SYSTEM_INSTRUCTION};
pub use chunk::split_into_chunks;
pub use corrector::{ChunkedCorrector, CorrectionReport};
pub use preamble::PreambleStripper;

#[derive(Error, Debug)]
pub enum CorrectionError {
    #[error("Failed to build correction client: {0}")]
    ClientBuild(String),

    #[error("Correction request failed: {0}")]
    Request(String),

    #[error("Correction endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Correction response had no content")]
    EmptyResponse,

    #[error("Correction request timed out")]
    Timeout,

    #[error("All {chunks} correction requests failed to reach the endpoint")]
    AllChunksFailed { chunks: usize },
}

impl CorrectionError {
    /// True when the endpoint could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, CorrectionError::Request(_) | CorrectionError::Timeout)
    }
}
