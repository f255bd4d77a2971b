use std::sync::Arc;

use secrecy::SecretString;
use tracing::Instrument;

use super::backend::{ChunkRequest, CorrectionBackend, HttpCorrectionBackend};
use super::chunk::split_into_chunks;
use super::preamble::PreambleStripper;
use super::CorrectionError;
use crate::config::CorrectionConfig;
use crate::error::{Pdf2TxtError, Result};

/// Outcome of a correction pass, with per-chunk accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionReport {
    pub text: String,
    pub total_chunks: usize,
    pub failed_chunks: usize,
}

/// Corrects long documents chunk by chunk, keeping the original text for any
/// chunk the model could not handle.
#[derive(Clone)]
pub struct ChunkedCorrector {
    backend: Arc<dyn CorrectionBackend>,
    stripper: PreambleStripper,
    chunk_size: usize,
}

impl ChunkedCorrector {
    pub fn new(
        backend: Arc<dyn CorrectionBackend>,
        stripper: PreambleStripper,
        chunk_size: usize,
    ) -> Self {
        Self {
            backend,
            stripper,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_config(config: &CorrectionConfig) -> Result<Self> {
        let backend = HttpCorrectionBackend::new(config).map_err(Pdf2TxtError::Correction)?;
        let stripper = PreambleStripper::new(&config.preamble_patterns)?;
        Ok(Self::new(Arc::new(backend), stripper, config.chunk_size))
    }

    pub async fn correct(
        &self,
        text: &str,
        credential: &SecretString,
    ) -> std::result::Result<String, CorrectionError> {
        self.correct_with_report(text, credential)
            .await
            .map(|report| report.text)
    }

    /// Errors only when every chunk failed because the endpoint was
    /// unreachable. Any other failure mix yields text, with the original
    /// chunk standing in for each failed one.
    pub async fn correct_with_report(
        &self,
        text: &str,
        credential: &SecretString,
    ) -> std::result::Result<CorrectionReport, CorrectionError> {
        let chunks = split_into_chunks(text, self.chunk_size);
        let span = tracing::info_span!("correction.run", chunks = chunks.len());
        self.correct_chunks(text, chunks, credential)
            .instrument(span)
            .await
    }

    async fn correct_chunks(
        &self,
        text: &str,
        chunks: Vec<String>,
        credential: &SecretString,
    ) -> std::result::Result<CorrectionReport, CorrectionError> {
        let total = chunks.len();
        let mut outputs = Vec::with_capacity(total);
        let mut failed = 0;
        let mut transport_failures = 0;

        for (i, chunk) in chunks.into_iter().enumerate() {
            let request = ChunkRequest {
                index: i + 1,
                total,
                content: chunk,
            };
            log::debug!(
                "Correcting chunk {}/{} ({} chars)",
                request.index,
                total,
                request.content.chars().count()
            );

            match self.backend.correct_chunk(credential, &request).await {
                Ok(output) => outputs.push(self.stripper.strip(&output)),
                Err(e) => {
                    log::warn!(
                        "Correction of chunk {}/{} failed, keeping original: {}",
                        request.index,
                        total,
                        e
                    );
                    failed += 1;
                    if e.is_transport() {
                        transport_failures += 1;
                    }
                    outputs.push(request.content.trim_end_matches(['\n', '\r']).to_string());
                }
            }
        }

        if total > 0 && failed == total {
            if transport_failures == total {
                return Err(CorrectionError::AllChunksFailed { chunks: total });
            }
            log::warn!("No chunk could be corrected, returning the original text");
            return Ok(CorrectionReport {
                text: text.to_string(),
                total_chunks: total,
                failed_chunks: failed,
            });
        }

        log::info!(
            "Correction finished: {}/{} chunks corrected",
            total - failed,
            total
        );
        Ok(CorrectionReport {
            text: outputs.join("\n\n"),
            total_chunks: total,
            failed_chunks: failed,
        })
    }
}
