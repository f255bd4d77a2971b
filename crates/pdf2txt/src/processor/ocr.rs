use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use crate::config::OcrConfig;
use crate::error::ProcessError;
use crate::processor::{pdf, OcrEngine};

/// Tesseract-backed OCR: rasterizes with pdftoppm, recognizes with leptess.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    preferred_language: String,
    fallback_language: String,
    dpi: u32,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(preferred_language: &str, fallback_language: &str, dpi: u32, timeout: Duration) -> Self {
        Self {
            preferred_language: preferred_language.to_string(),
            fallback_language: fallback_language.to_string(),
            dpi,
            timeout,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            &config.preferred_language,
            &config.fallback_language,
            config.dpi,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// OCRs one page image, retrying with the fallback language when the
    /// preferred model fails.
    pub fn recognize_page(&self, image_data: &[u8]) -> Result<String, ProcessError> {
        let png = normalize_to_png(image_data)?;

        match recognize_png(&png, &self.preferred_language) {
            Ok(text) => Ok(text),
            Err(e) if self.fallback_language != self.preferred_language => {
                log::warn!(
                    "OCR with '{}' failed ({}), retrying with '{}'",
                    self.preferred_language,
                    e,
                    self.fallback_language
                );
                recognize_png(&png, &self.fallback_language)
            }
            Err(e) => Err(e),
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize_pdf(&self, path: &Path) -> Result<Vec<String>, ProcessError> {
        let _span = tracing::info_span!("processor.ocr", lang = %self.preferred_language).entered();

        let scratch = tempfile::TempDir::new().map_err(|e| {
            ProcessError::OcrFailed(format!("Failed to create rasterization directory: {}", e))
        })?;

        let images = pdf::render_pages(path, scratch.path(), self.dpi, self.timeout)?;

        images
            .iter()
            .map(|image_path| {
                let data =
                    std::fs::read(image_path).map_err(|e| ProcessError::ReadDocument {
                        path: image_path.clone(),
                        source: e,
                    })?;
                self.recognize_page(&data)
            })
            .collect()
    }
}

/// Re-encodes any supported raster format as PNG for leptess.
fn normalize_to_png(image_data: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let img = image::load_from_memory(image_data)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to load image: {}", e)))?;

    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to convert image: {}", e)))?;
    Ok(png_data)
}

fn recognize_png(png_data: &[u8], language: &str) -> Result<String, ProcessError> {
    let mut lt = leptess::LepTess::new(None, language).map_err(|e| {
        ProcessError::OcrFailed(format!(
            "Failed to initialize Tesseract for '{}': {}",
            language, e
        ))
    })?;

    lt.set_image_from_mem(png_data)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

    lt.get_utf8_text()
        .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let ocr = TesseractOcr::from_config(&OcrConfig::default());
        assert_eq!(ocr.preferred_language, "fra");
        assert_eq!(ocr.fallback_language, "eng");
        assert_eq!(ocr.dpi(), 300);
        assert_eq!(ocr.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_image_data_error() {
        let ocr = TesseractOcr::new("fra", "eng", 300, Duration::from_secs(5));
        match ocr.recognize_page(b"not valid image data") {
            Err(ProcessError::OcrFailed(msg)) => assert!(msg.contains("Failed to load image")),
            other => panic!("Expected OcrFailed error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_image_data_error() {
        let ocr = TesseractOcr::new("fra", "eng", 300, Duration::from_secs(5));
        assert!(matches!(
            ocr.recognize_page(&[]),
            Err(ProcessError::OcrFailed(_))
        ));
    }

    #[test]
    fn test_recognize_pdf_missing_file_fails() {
        let ocr = TesseractOcr::new("fra", "eng", 72, Duration::from_secs(5));
        assert!(ocr.recognize_pdf(Path::new("/nonexistent/scan.pdf")).is_err());
    }
}
