//! Shared test utilities for pdf2txt integration tests.
//!
//! - `TestHarness` wires a real `Pipeline` to fakes for OCR, correction and
//!   webhook delivery, over temporary directories and an in-memory store
//! - `build_pdf` generates small PDFs with a chosen text layer

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{TestHarness, WEBHOOK};
