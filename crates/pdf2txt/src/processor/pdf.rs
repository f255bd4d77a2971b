use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::ProcessError;

/// Reads the PDF text layer page by page, joining pages with `\n`.
///
/// Pages whose text cannot be decoded contribute an empty string.
pub fn extract_native(path: &Path) -> Result<String, ProcessError> {
    let _span = tracing::info_span!("processor.native").entered();

    let pdf_bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
        path: path.to_path_buf(),
        source: e,
    })?;

    let doc = lopdf::Document::load_mem(&pdf_bytes)
        .map_err(|e| ProcessError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

    let pages: Vec<String> = doc
        .get_pages()
        .keys()
        .map(|page_num| doc.extract_text(&[*page_num]).unwrap_or_default())
        .collect();

    Ok(pages.join("\n"))
}

/// Rasterizes every page of `pdf_path` to PNG files inside `out_dir`.
///
/// Returns the images in page order. The whole render is bounded by `timeout`;
/// pdftoppm is killed when it runs over.
pub fn render_pages(
    pdf_path: &Path,
    out_dir: &Path,
    dpi: u32,
    timeout: Duration,
) -> Result<Vec<PathBuf>, ProcessError> {
    let _span = tracing::info_span!("processor.rasterize", dpi).entered();

    let mut command = Command::new("pdftoppm");
    command
        .arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .arg(pdf_path)
        .arg(out_dir.join("page"));
    run_bounded(command, timeout)?;

    collect_page_images(out_dir)
}

/// Runs `command` to completion within `timeout`.
///
/// Stderr is drained on its own thread while the child runs; damaged scans
/// make pdftoppm print thousands of warnings and a full pipe would stall it.
fn run_bounded(mut command: Command, timeout: Duration) -> Result<(), ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            ProcessError::PdfProcessing(format!(
                "Failed to run {}: {}. Make sure poppler-utils is installed.",
                program, e
            ))
        })?;

    let stderr_reader = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::PdfProcessing(format!(
                    "{} timed out after {}s",
                    program,
                    timeout.as_secs()
                )));
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => {
                return Err(ProcessError::PdfProcessing(format!(
                    "Failed to wait for {}: {}",
                    program, e
                )))
            }
        }
    };

    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();
    if !status.success() {
        return Err(ProcessError::PdfProcessing(format!(
            "{} failed: {}",
            program,
            last_lines(&stderr, 3)
        )));
    }
    if !stderr.trim().is_empty() {
        log::debug!("{} reported {} warning lines", program, stderr.lines().count());
    }
    Ok(())
}

/// The last `n` non-blank lines of `text`, joined with `; `.
fn last_lines(text: &str, n: usize) -> String {
    let mut lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .rev()
        .take(n)
        .collect();
    lines.reverse();
    lines.join("; ")
}

/// Lists `page-<n>.png` files (pdftoppm zero-pads `n` by page count) in page order.
pub(crate) fn collect_page_images(dir: &Path) -> Result<Vec<PathBuf>, ProcessError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProcessError::ReadDocument {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut pages: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| {
            let number = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("page-"))
                .and_then(|n| n.strip_suffix(".png"))
                .and_then(|n| n.parse::<u32>().ok())?;
            Some((number, path))
        })
        .collect();

    if pages.is_empty() {
        return Err(ProcessError::PdfProcessing(
            "pdftoppm produced no page images".to_string(),
        ));
    }

    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}
