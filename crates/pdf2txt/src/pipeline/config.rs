use secrecy::SecretString;

use crate::config::Config;
use crate::error::Result;
use crate::secrets::resolve_secret_optional;
use crate::worker::JobId;

pub struct PipelineConfig {
    pub base_url: String,
    pub api_prefix: String,
    /// Correction credential from the config file; the database setting wins.
    pub correction_credential: Option<SecretString>,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let correction_credential = resolve_secret_optional(
            config.correction.token.as_deref(),
            config.correction.token_file.as_deref(),
            config.correction.token_env_var.as_deref(),
        )?;

        Ok(Self {
            base_url: config.base_url.clone(),
            api_prefix: config.api_prefix.clone(),
            correction_credential,
        })
    }

    /// `<base_url><api_prefix>/extract/<id>/download?token=<token>`
    pub fn download_url(&self, job_id: JobId, token: &str) -> String {
        format!(
            "{}{}/extract/{}/download?token={}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix,
            job_id,
            token
        )
    }
}
