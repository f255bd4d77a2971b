//! Signed, time-limited capability tokens for result downloads.
//!
//! Two kinds of token are accepted on the download path:
//!
//! - **Download tokens** carry `type = "download"` and the job id as `sub`.
//!   They grant access to exactly that job, whoever holds them.
//! - **Session tokens** carry the owner's email as `sub` and no `type`.
//!   They grant access to the owner's own jobs.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TokenConfig;
use crate::db::{user_repo, Database, DatabaseError};
use crate::secrets::{resolve_secret_optional, SecretError};
use crate::worker::JobId;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token does not identify a validated user")]
    Unauthorized,

    #[error("Token is not valid for this job")]
    Forbidden,

    #[error("Failed to sign token: {0}")]
    Encode(String),

    #[error("Failed to resolve token signing key: {0}")]
    Secret(#[from] SecretError),

    #[error("Failed to look up token owner: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<TokenPurpose>,
}

/// What a token accepted by [`TokenIssuer::authorize_download`] grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadGrant {
    /// A download token scoped to the requested job.
    JobToken,
    /// A session token; the job must belong to `user_id`.
    Owner { user_id: i64 },
}

impl DownloadGrant {
    pub fn permits_owner(&self, owner_id: i64) -> bool {
        match self {
            DownloadGrant::JobToken => true,
            DownloadGrant::Owner { user_id } => *user_id == owner_id,
        }
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    download_ttl: Duration,
    session_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &SecretString, download_ttl: Duration, session_ttl: Duration) -> Self {
        let key = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            download_ttl,
            session_ttl,
        }
    }

    /// Builds an issuer from the configured signing key. Without one, a random
    /// per-process key is used and tokens do not survive a restart.
    pub fn from_config(config: &TokenConfig) -> Result<Self, TokenError> {
        let secret = resolve_secret_optional(
            config.secret.as_deref(),
            config.secret_file.as_deref(),
            config.secret_env_var.as_deref(),
        )?
        .unwrap_or_else(|| {
            log::warn!("No token signing key configured, using an ephemeral key");
            SecretString::from(format!(
                "{}{}",
                uuid::Uuid::new_v4().simple(),
                uuid::Uuid::new_v4().simple()
            ))
        });

        Ok(Self::new(
            &secret,
            Duration::days(config.download_ttl_days),
            Duration::minutes(config.session_ttl_minutes),
        ))
    }

    /// Mints a download token for `job_id` valid for `ttl`.
    pub fn issue(&self, job_id: JobId, ttl: Duration) -> Result<String, TokenError> {
        self.sign(job_id.to_string(), ttl, Some(TokenPurpose::Download))
    }

    /// Mints a download token with the configured lifetime.
    pub fn issue_download(&self, job_id: JobId) -> Result<String, TokenError> {
        self.issue(job_id, self.download_ttl)
    }

    pub fn issue_session(&self, email: &str) -> Result<String, TokenError> {
        self.sign(email.to_string(), self.session_ttl, None)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Token rejected: {}", e);
                TokenError::InvalidToken
            })
    }

    /// Checks `token` against `job_id`.
    ///
    /// Job ownership for session tokens is left to the caller through
    /// [`DownloadGrant::permits_owner`], since a foreign job must look absent.
    pub fn authorize_download(
        &self,
        db: &Database,
        job_id: JobId,
        token: &str,
    ) -> Result<DownloadGrant, TokenError> {
        let claims = self.verify(token)?;

        match claims.purpose {
            Some(TokenPurpose::Download) => {
                if claims.sub == job_id.to_string() {
                    Ok(DownloadGrant::JobToken)
                } else {
                    Err(TokenError::Forbidden)
                }
            }
            None => match user_repo::find_by_email(db, &claims.sub)? {
                Some(user) if user.is_validated => Ok(DownloadGrant::Owner { user_id: user.id }),
                _ => Err(TokenError::Unauthorized),
            },
        }
    }

    fn sign(
        &self,
        sub: String,
        ttl: Duration,
        purpose: Option<TokenPurpose>,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            purpose,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }
}
