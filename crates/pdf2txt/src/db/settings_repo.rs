//! Single-row `system_config` table: operator-managed settings that can change
//! without a restart.

use rusqlite::params;
use secrecy::SecretString;

use super::{Database, DatabaseError};

#[derive(Debug, Clone, Default)]
pub struct SystemSettings {
    pub hf_token: Option<String>,
    pub discord_webhook: Option<String>,
}

pub fn load(db: &Database) -> Result<SystemSettings, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT hf_token, discord_webhook FROM system_config WHERE id = 1",
            [],
            |r| {
                Ok(SystemSettings {
                    hf_token: r.get(0)?,
                    discord_webhook: r.get(1)?,
                })
            },
        )?)
    })
}

pub fn save(db: &Database, settings: &SystemSettings) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO system_config (id, hf_token, discord_webhook) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET hf_token = ?1, discord_webhook = ?2",
            params![settings.hf_token, settings.discord_webhook],
        )?;
        Ok(())
    })
}

/// The stored correction credential, if a non-blank one is set.
pub fn correction_token(db: &Database) -> Result<Option<SecretString>, DatabaseError> {
    Ok(load(db)?
        .hf_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(SecretString::from))
}
