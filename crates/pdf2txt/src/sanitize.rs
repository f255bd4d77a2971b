//! Helpers for sanitizing data before it enters log lines and span fields.
//!
//! Webhook URLs embed credentials in their path, and user files live under
//! directories derived from email addresses, so neither goes into logs verbatim.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Keeps scheme and host of a URL and masks the rest.
///
/// - `https://discord.com/api/webhooks/123/abc` → `https://discord.com/****`
/// - `http://hooks.local` → `http://hooks.local`
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return "****".to_string();
    };
    let after_scheme = &url[scheme_end + 3..];
    let host = after_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default();
    let has_path = after_scheme.len() > host.len() && after_scheme.contains('/');
    if has_path {
        format!("{}{}/****", &url[..scheme_end + 3], host)
    } else {
        format!("{}{}", &url[..scheme_end + 3], host)
    }
}
