use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::sanitize::redact_path;

/// Writes result files under `<users_dir>/<owner_dir>/` and stages uploads
/// under the temp directory. Existing files are never overwritten.
#[derive(Debug, Clone)]
pub struct ResultStore {
    users_directory: PathBuf,
    temp_directory: PathBuf,
}

impl ResultStore {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(users_directory: P, temp_directory: Q) -> Self {
        Self {
            users_directory: users_directory.as_ref().to_path_buf(),
            temp_directory: temp_directory.as_ref().to_path_buf(),
        }
    }

    pub fn users_directory(&self) -> &Path {
        &self.users_directory
    }

    pub fn temp_directory(&self) -> &Path {
        &self.temp_directory
    }

    pub fn owner_directory(&self, directory_name: &str) -> PathBuf {
        self.users_directory.join(directory_name)
    }

    pub fn ensure_owner_directory(&self, directory_name: &str) -> Result<PathBuf, StorageError> {
        let dir = self.owner_directory(directory_name);
        ensure_directory(&dir)?;
        Ok(dir)
    }

    /// Writes `text` to `<owner_dir>/<YYYYMMDD_HHMMSS>_<label>.txt`, adding a
    /// `_2`, `_3`... suffix when the name is taken.
    pub fn store_result(
        &self,
        directory_name: &str,
        external_label: &str,
        finished_at: &DateTime<Utc>,
        text: &str,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.ensure_owner_directory(directory_name)?;
        let base = format!(
            "{}_{}",
            finished_at.format("%Y%m%d_%H%M%S"),
            sanitize_label(external_label)
        );
        create_exclusive(&dir, &base, "txt", text.as_bytes())
    }

    /// Copies an uploaded PDF into the temp directory under a unique name.
    pub fn stage_upload(&self, original_name: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        ensure_directory(&self.temp_directory)?;
        let name = Path::new(original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.pdf");
        let base = format!("{}_{}", uuid::Uuid::new_v4(), sanitize_label(name));
        let (stem, ext) = match base.rfind('.') {
            Some(dot) => (&base[..dot], &base[dot + 1..]),
            None => (base.as_str(), "pdf"),
        };
        create_exclusive(&self.temp_directory, stem, ext, content)
    }
}

/// Deletes a job's source file. A missing file is fine; other failures are
/// logged and swallowed.
pub fn remove_source(path: &Path) {
    remove_logged("source", path);
}

/// Deletes a result file no job record points to.
pub fn discard_result(path: &Path) {
    remove_logged("result", path);
}

fn remove_logged(kind: &str, path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::info!("Removed {} file {}", kind, redact_path(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("{} file {} already gone", kind, redact_path(path))
        }
        Err(e) => log::error!("Failed to remove {} file {}: {}", kind, redact_path(path), e),
    }
}

/// Replaces path separators and control characters so a label is usable as
/// part of a file name.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

fn create_exclusive(
    dir: &Path,
    stem: &str,
    extension: &str,
    content: &[u8],
) -> Result<PathBuf, StorageError> {
    for counter in 1..=1000 {
        let filename = if counter == 1 {
            format!("{}.{}", stem, extension)
        } else {
            format!("{}_{}.{}", stem, counter, extension)
        };
        let path = dir.join(&filename);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(content)
                    .map_err(|e| StorageError::WriteFile {
                        path: path.clone(),
                        source: e,
                    })?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StorageError::WriteFile { path, source: e }),
        }
    }

    Err(StorageError::FileExists(
        dir.join(format!("{}.{}", stem, extension)),
    ))
}
