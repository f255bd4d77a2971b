//! Append-only journal of notable user actions: validations and extraction
//! requests.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use super::{format_timestamp, get_timestamp, Database, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRow {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

impl ActivityRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            action: row.get("action")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }
}

pub fn record(
    db: &Database,
    user_id: i64,
    action: &str,
    at: &DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO activity_logs (user_id, action, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, action, format_timestamp(at)],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// A user's journal, newest first.
pub fn list_for_user(db: &Database, user_id: i64) -> Result<Vec<ActivityRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM activity_logs WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], ActivityRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
