pub mod ocr;
pub mod pdf;

use std::path::Path;
use std::sync::Arc;

use crate::config::OcrConfig;
use crate::error::ProcessError;
use crate::sanitize::redact_path;

pub use ocr::TesseractOcr;

/// Turns a PDF into per-page text by optical character recognition.
pub trait OcrEngine: Send + Sync {
    fn recognize_pdf(&self, path: &Path) -> Result<Vec<String>, ProcessError>;
}

/// Which strategy produced the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Native,
    Ocr,
    /// OCR failed; the (short) native text was kept.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
}

/// Native text extraction with OCR fallback for scanned documents.
#[derive(Clone)]
pub struct TextExtractor {
    ocr: Arc<dyn OcrEngine>,
    min_native_chars: usize,
}

impl TextExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, min_native_chars: usize) -> Self {
        Self {
            ocr,
            min_native_chars,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            Arc::new(TesseractOcr::from_config(config)),
            config.min_native_chars,
        )
    }

    pub fn extract(&self, path: &Path) -> Result<String, ProcessError> {
        self.extract_with_method(path).map(|e| e.text)
    }

    /// Fails only when `path` does not exist. OCR trouble degrades to the
    /// native text instead of failing.
    pub fn extract_with_method(&self, path: &Path) -> Result<Extraction, ProcessError> {
        let _span = tracing::info_span!("processor.extract", file = %redact_path(path)).entered();

        if !path.exists() {
            return Err(ProcessError::NotFound(path.to_path_buf()));
        }

        let native = match pdf::extract_native(path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Native extraction failed, falling back to OCR: {}", e);
                String::new()
            }
        };
        let native = native.trim();

        if has_usable_text_layer(native, self.min_native_chars) {
            log::info!("Extracted {} chars from the text layer", native.chars().count());
            return Ok(Extraction {
                text: native.to_string(),
                method: ExtractionMethod::Native,
            });
        }

        log::info!("Text layer too short, assuming a scanned document; running OCR");
        match self.ocr.recognize_pdf(path) {
            Ok(pages) => Ok(Extraction {
                text: pages.join("\n").trim().to_string(),
                method: ExtractionMethod::Ocr,
            }),
            Err(e) => {
                log::error!("OCR extraction failed, keeping native text: {}", e);
                Ok(Extraction {
                    text: native.to_string(),
                    method: ExtractionMethod::Degraded,
                })
            }
        }
    }
}

/// A trimmed text layer strictly longer than `min_chars` characters is used as-is.
fn has_usable_text_layer(trimmed: &str, min_chars: usize) -> bool {
    trimmed.chars().count() > min_chars
}
