//! Owner records. Registration and login live outside this crate; the
//! pipeline only needs an owner's identity and storage directory.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, get_timestamp, Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    /// Set when the account is validated; names the owner's result directory.
    pub directory_name: Option<String>,
    pub is_validated: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            directory_name: row.get("directory_name")?,
            is_validated: row.get("is_validated")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }
}

/// Derives a filesystem-safe directory name from an email address.
///
/// `moi@ici.fr` becomes `moi_at_ici_fr`.
pub fn directory_name_for(email: &str) -> String {
    email
        .replace('@', "_at_")
        .replace('.', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Inserts an unvalidated user and returns its id.
pub fn insert(db: &Database, email: &str, created_at: &DateTime<Utc>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (email, is_validated, created_at) VALUES (?1, 0, ?2)",
            params![email, format_timestamp(created_at)],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Marks a user validated and assigns its directory name.
pub fn validate(db: &Database, id: i64, directory_name: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE users SET is_validated = 1, directory_name = ?2 WHERE id = ?1",
            params![id, directory_name],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM users WHERE id = ?1",
                params![id],
                UserRow::from_row,
            )
            .optional()?)
    })
}

pub fn find_by_email(db: &Database, email: &str) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM users WHERE email = ?1",
                params![email],
                UserRow::from_row,
            )
            .optional()?)
    })
}
