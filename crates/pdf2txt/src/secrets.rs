//! Secret resolution for the correction credential and the token signing key.
//!
//! Sources are tried in priority order:
//!
//! 1. **Direct value** - inline in the config file, for local testing
//! 2. **File reference** - Docker secrets style (`/run/secrets/hf_token`)
//! 3. **Env var reference** - e.g. `HF_TOKEN` or `PDF2TXT_SECRET_KEY`

use secrecy::SecretString;
use std::fs;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first configured source.
///
/// Direct values and file paths that are empty strings count as "not set".
/// File contents and env values are trimmed.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        return non_empty(content.trim(), &expanded);
    }

    if let Some(var_name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(var_name) {
            Ok(value) => non_empty(value.trim(), var_name),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: var_name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Like [`resolve_secret`], but a missing source or unset env var yields `None`.
///
/// Used for the correction credential, which may legitimately be absent.
pub fn resolve_secret_optional(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(direct, file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided)
        | Err(SecretError::EnvVarNotSet { .. })
        | Err(SecretError::Empty { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn non_empty(value: &str, origin: &str) -> Result<SecretString> {
    if value.is_empty() {
        return Err(SecretError::Empty {
            origin: origin.to_string(),
        });
    }
    Ok(SecretString::from(value.to_string()))
}

/// Expands a leading `~` to the user's home directory. `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    #[serial]
    fn test_direct_value_takes_priority() {
        std::env::set_var("PDF2TXT_TEST_SECRET_1", "env_value");
        let result =
            resolve_secret(Some("direct_value"), None, Some("PDF2TXT_TEST_SECRET_1")).unwrap();
        assert_eq!(result.expose_secret(), "direct_value");
        std::env::remove_var("PDF2TXT_TEST_SECRET_1");
    }

    #[test]
    #[serial]
    fn test_file_takes_priority_over_env() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "file_value").unwrap();

        std::env::set_var("PDF2TXT_TEST_SECRET_2", "env_value");
        let result = resolve_secret(
            None,
            Some(temp_file.path().to_str().unwrap()),
            Some("PDF2TXT_TEST_SECRET_2"),
        )
        .unwrap();
        assert_eq!(result.expose_secret(), "file_value");
        std::env::remove_var("PDF2TXT_TEST_SECRET_2");
    }

    #[test]
    #[serial]
    fn test_env_var_fallback_is_trimmed() {
        std::env::set_var("PDF2TXT_TEST_SECRET_3", "  hf_abc123\n");
        let result = resolve_secret(None, None, Some("PDF2TXT_TEST_SECRET_3")).unwrap();
        assert_eq!(result.expose_secret(), "hf_abc123");
        std::env::remove_var("PDF2TXT_TEST_SECRET_3");
    }

    #[test]
    fn test_no_source_error() {
        let result = resolve_secret(None, None, None);
        assert!(matches!(result, Err(SecretError::NoSourceProvided)));
    }

    #[test]
    fn test_file_not_found_error() {
        let result = resolve_secret(None, Some("/nonexistent/path/to/secret"), None);
        assert!(matches!(result, Err(SecretError::FileReadError { .. })));
    }

    #[test]
    fn test_blank_file_is_empty_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "   ").unwrap();
        let result = resolve_secret(None, Some(temp_file.path().to_str().unwrap()), None);
        assert!(matches!(result, Err(SecretError::Empty { .. })));
    }

    #[test]
    #[serial]
    fn test_optional_treats_unset_env_as_absent() {
        std::env::remove_var("PDF2TXT_TEST_SECRET_MISSING");
        let result = resolve_secret_optional(None, None, Some("PDF2TXT_TEST_SECRET_MISSING"));
        assert!(result.unwrap().is_none());

        std::env::set_var("PDF2TXT_TEST_SECRET_OPT", "value");
        let result = resolve_secret_optional(None, None, Some("PDF2TXT_TEST_SECRET_OPT")).unwrap();
        assert_eq!(result.unwrap().expose_secret(), "value");
        std::env::remove_var("PDF2TXT_TEST_SECRET_OPT");
    }

    #[test]
    fn test_optional_still_reports_unreadable_file() {
        let result = resolve_secret_optional(None, Some("/nonexistent/secret"), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_home_leaves_other_paths() {
        assert_eq!(expand_home("/absolute/path"), "/absolute/path");
        assert_eq!(expand_home("relative/path"), "relative/path");
    }
}
