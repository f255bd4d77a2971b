use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    /// Public base URL used to build download links, e.g. `https://host`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Root of all runtime data: users, temp uploads and the database.
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

fn default_data_directory() -> String {
    "./data".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

impl Config {
    pub fn users_directory(&self) -> PathBuf {
        PathBuf::from(&self.data_directory).join("users")
    }

    pub fn temp_directory(&self) -> PathBuf {
        PathBuf::from(&self.data_directory).join("temp")
    }

    pub fn database_file(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.data_directory)
                .join("db")
                .join("pdf2txt.db"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            data_directory: default_data_directory(),
            database_path: None,
            worker_count: default_worker_count(),
            ocr: OcrConfig::default(),
            correction: CorrectionConfig::default(),
            notifications: NotificationConfig::default(),
            tokens: TokenConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrConfig {
    #[serde(default = "default_preferred_language")]
    pub preferred_language: String,
    #[serde(default = "default_fallback_language")]
    pub fallback_language: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Native text longer than this (trimmed, in characters) skips OCR.
    #[serde(default = "default_min_native_chars")]
    pub min_native_chars: usize,
    /// Upper bound for rasterizing the whole document.
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

fn default_preferred_language() -> String {
    "fra".to_string()
}

fn default_fallback_language() -> String {
    "eng".to_string()
}

fn default_dpi() -> u32 {
    300
}

fn default_min_native_chars() -> usize {
    120
}

fn default_ocr_timeout() -> u64 {
    300
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            preferred_language: default_preferred_language(),
            fallback_language: default_fallback_language(),
            dpi: default_dpi(),
            min_native_chars: default_min_native_chars(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_correction_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_correction_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum characters per chunk sent to the model.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Per-request timeout.
    #[serde(default = "default_correction_timeout")]
    pub timeout_secs: u64,
    /// Case-insensitive regexes for introductory phrases stripped from model output.
    #[serde(default = "default_preamble_patterns")]
    pub preamble_patterns: Vec<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default)]
    pub token_env_var: Option<String>,
}

fn default_correction_endpoint() -> String {
    "https://router.huggingface.co/v1/chat/completions".to_string()
}

fn default_correction_model() -> String {
    "meta-llama/Llama-3.1-8B-Instruct".to_string()
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_temperature() -> f32 {
    0.1
}

fn default_chunk_size() -> usize {
    3000
}

fn default_correction_timeout() -> u64 {
    120
}

pub fn default_preamble_patterns() -> Vec<String> {
    [
        r"voici le texte (?:nettoy[ée]|corrig[ée])(?:\s+et\s+(?:nettoy[ée]|corrig[ée]))?\s*:?",
        r"voici (?:la version|le texte) (?:nettoy[ée]e?|corrig[ée]e?)\s*:?",
        r"texte (?:nettoy[ée]|corrig[ée])\s*:",
        r"here is the (?:cleaned|corrected)(?:\s+and\s+(?:cleaned|corrected))? text\s*:?",
        r"(?:sure|certainly|of course)[,!.]?\s+here is[^:\n]*:",
        r"cleaned text\s*:",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_correction_endpoint(),
            model: default_correction_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            chunk_size: default_chunk_size(),
            timeout_secs: default_correction_timeout(),
            preamble_patterns: default_preamble_patterns(),
            token: None,
            token_file: None,
            token_env_var: Some("HF_TOKEN".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
    /// URL fragments identifying chat webhooks that need message framing.
    #[serde(default = "default_chat_markers")]
    pub chat_webhook_markers: Vec<String>,
    #[serde(default = "default_chat_max_chars")]
    pub chat_max_chars: usize,
    #[serde(default)]
    pub operator_webhook: Option<String>,
}

fn default_notification_timeout() -> u64 {
    30
}

fn default_chat_markers() -> Vec<String> {
    vec!["discord.com/api/webhooks".to_string()]
}

fn default_chat_max_chars() -> usize {
    1800
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_notification_timeout(),
            chat_webhook_markers: default_chat_markers(),
            chat_max_chars: default_chat_max_chars(),
            operator_webhook: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub secret_file: Option<String>,
    #[serde(default = "default_secret_env_var")]
    pub secret_env_var: Option<String>,
    #[serde(default = "default_download_ttl_days")]
    pub download_ttl_days: i64,
    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: i64,
}

fn default_secret_env_var() -> Option<String> {
    Some("PDF2TXT_SECRET_KEY".to_string())
}

fn default_download_ttl_days() -> i64 {
    365
}

fn default_session_ttl_minutes() -> i64 {
    60 * 24 * 7
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_file: None,
            secret_env_var: default_secret_env_var(),
            download_ttl_days: default_download_ttl_days(),
            session_ttl_minutes: default_session_ttl_minutes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}
