//! Job repository for the `extraction_jobs` table.
//!
//! State transitions are targeted column updates guarded by the row's
//! `attempt` counter, so a run that was superseded by a re-submission cannot
//! overwrite the newer attempt's state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, get_opt_timestamp, get_timestamp, Database, DatabaseError};
use crate::worker::{JobId, JobStatus};

/// A job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: JobId,
    pub external_label: String,
    pub owner_id: i64,
    pub status: JobStatus,
    pub webhook_url: String,
    pub source_file_path: Option<PathBuf>,
    pub result_file_path: Option<PathBuf>,
    pub correction_requested: bool,
    /// Bumped on every re-submission under the same label.
    pub attempt: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status_idx = row.as_ref().column_index("status")?;
        let status: String = row.get(status_idx)?;
        let status = status.parse::<JobStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                status_idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            external_label: row.get("external_label")?,
            owner_id: row.get("owner_id")?,
            status,
            webhook_url: row.get("webhook_url")?,
            source_file_path: row
                .get::<_, Option<String>>("source_file_path")?
                .map(PathBuf::from),
            result_file_path: row
                .get::<_, Option<String>>("result_file_path")?
                .map(PathBuf::from),
            correction_requested: row.get("correction_requested")?,
            attempt: row.get("attempt")?,
            error_message: row.get("error_message")?,
            created_at: get_timestamp(row, "created_at")?,
            completed_at: get_opt_timestamp(row, "completed_at")?,
        })
    }
}

/// Fields supplied by a submission, for both first insert and re-submission.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_id: i64,
    pub external_label: String,
    pub webhook_url: String,
    pub source_file_path: PathBuf,
    pub correction_requested: bool,
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Inserts a new `pending` job and returns its id.
pub fn insert(
    db: &Database,
    job: &NewJob,
    created_at: &DateTime<Utc>,
) -> Result<JobId, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO extraction_jobs (external_label, owner_id, status, webhook_url,
             source_file_path, correction_requested, created_at)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6)",
            params![
                job.external_label,
                job.owner_id,
                job.webhook_url,
                path_text(&job.source_file_path),
                job.correction_requested,
                format_timestamp(created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Resets an existing job for a fresh submission.
///
/// Returns the previous source file when the job had not started yet: no run
/// will ever pick that file up, so the caller owns its cleanup.
pub fn resubmit(
    db: &Database,
    id: JobId,
    job: &NewJob,
) -> Result<Option<PathBuf>, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        let previous: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT status, source_file_path FROM extraction_jobs WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        tx.execute(
            "UPDATE extraction_jobs SET status = 'pending', webhook_url = ?2,
             source_file_path = ?3, correction_requested = ?4, result_file_path = NULL,
             error_message = NULL, completed_at = NULL, attempt = attempt + 1
             WHERE id = ?1",
            params![
                id,
                job.webhook_url,
                path_text(&job.source_file_path),
                job.correction_requested,
            ],
        )?;
        tx.commit()?;

        let new_source = path_text(&job.source_file_path);
        Ok(match previous {
            Some((status, Some(old_source)))
                if status == JobStatus::Pending.as_str() && old_source != new_source =>
            {
                Some(PathBuf::from(old_source))
            }
            _ => None,
        })
    })
}

/// Overwrites every mutable field of a job.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE extraction_jobs SET external_label = ?2, status = ?3, webhook_url = ?4,
             source_file_path = ?5, result_file_path = ?6, correction_requested = ?7,
             attempt = ?8, error_message = ?9, completed_at = ?10
             WHERE id = ?1",
            params![
                job.id,
                job.external_label,
                job.status.as_str(),
                job.webhook_url,
                job.source_file_path.as_deref().map(path_text),
                job.result_file_path.as_deref().map(path_text),
                job.correction_requested,
                job.attempt,
                job.error_message,
                job.completed_at.as_ref().map(format_timestamp),
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its id.
pub fn find_by_id(db: &Database, id: JobId) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM extraction_jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds the latest job an owner submitted under `label`.
pub fn find_by_label(
    db: &Database,
    owner_id: i64,
    label: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM extraction_jobs WHERE owner_id = ?1 AND external_label = ?2
                 ORDER BY id DESC LIMIT 1",
                params![owner_id, label],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists an owner's jobs, newest first.
pub fn list_by_owner(db: &Database, owner_id: i64) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM extraction_jobs WHERE owner_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// `pending -> processing`. Returns false if the attempt was superseded or
/// already started.
pub fn mark_processing(db: &Database, id: JobId, attempt: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extraction_jobs SET status = 'processing'
             WHERE id = ?1 AND attempt = ?2 AND status = 'pending'",
            params![id, attempt],
        )?;
        Ok(changed == 1)
    })
}

/// `processing -> success`, recording the result file.
pub fn mark_success(
    db: &Database,
    id: JobId,
    attempt: i64,
    result_path: &Path,
    completed_at: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extraction_jobs SET status = 'success', result_file_path = ?3,
             error_message = NULL, completed_at = ?4
             WHERE id = ?1 AND attempt = ?2 AND status = 'processing'",
            params![
                id,
                attempt,
                path_text(result_path),
                format_timestamp(completed_at)
            ],
        )?;
        Ok(changed == 1)
    })
}

/// `processing -> error`, recording the failure message.
pub fn mark_error(
    db: &Database,
    id: JobId,
    attempt: i64,
    message: &str,
    completed_at: &DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE extraction_jobs SET status = 'error', error_message = ?3, completed_at = ?4
             WHERE id = ?1 AND attempt = ?2 AND status = 'processing'",
            params![id, attempt, message, format_timestamp(completed_at)],
        )?;
        Ok(changed == 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::user_repo;

    fn test_db() -> (Database, i64) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let owner = user_repo::insert(&db, "owner@example.com", &Utc::now()).unwrap();
        (db, owner)
    }

    fn new_job(owner_id: i64, label: &str, source: &str) -> NewJob {
        NewJob {
            owner_id,
            external_label: label.to_string(),
            webhook_url: "http://hooks.local/done".to_string(),
            source_file_path: PathBuf::from(source),
            correction_requested: false,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "invoice-42", "/tmp/a.pdf"), &Utc::now()).unwrap();

        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.external_label, "invoice-42");
        assert_eq!(row.status, JobStatus::Pending);
        assert_eq!(row.source_file_path, Some(PathBuf::from("/tmp/a.pdf")));
        assert_eq!(row.attempt, 1);
        assert!(row.completed_at.is_none());
        assert!(row.result_file_path.is_none());
    }

    #[test]
    fn test_find_missing() {
        let (db, _) = test_db();
        assert!(find_by_id(&db, 999).unwrap().is_none());
        assert!(find_by_label(&db, 1, "nothing").unwrap().is_none());
    }

    #[test]
    fn test_find_by_label_is_scoped_to_owner() {
        let (db, owner) = test_db();
        let other = user_repo::insert(&db, "other@example.com", &Utc::now()).unwrap();
        insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();

        assert!(find_by_label(&db, owner, "report").unwrap().is_some());
        assert!(find_by_label(&db, other, "report").unwrap().is_none());
    }

    #[test]
    fn test_full_lifecycle_success() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();

        assert!(mark_processing(&db, id, 1).unwrap());
        assert_eq!(
            find_by_id(&db, id).unwrap().unwrap().status,
            JobStatus::Processing
        );

        let done = Utc::now();
        assert!(mark_success(&db, id, 1, Path::new("/data/out.txt"), &done).unwrap());
        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Success);
        assert_eq!(row.result_file_path, Some(PathBuf::from("/data/out.txt")));
        assert!(row.completed_at.is_some());
    }

    #[test]
    fn test_mark_error_records_message() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();
        mark_processing(&db, id, 1).unwrap();

        assert!(mark_error(&db, id, 1, "Source file not found", &Utc::now()).unwrap());
        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Error);
        assert_eq!(row.error_message.as_deref(), Some("Source file not found"));
    }

    #[test]
    fn test_terminal_transition_requires_processing() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();
        assert!(!mark_success(&db, id, 1, Path::new("/x.txt"), &Utc::now()).unwrap());
        assert!(!mark_error(&db, id, 1, "nope", &Utc::now()).unwrap());
    }

    #[test]
    fn test_resubmit_resets_terminal_job() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();
        mark_processing(&db, id, 1).unwrap();
        mark_error(&db, id, 1, "boom", &Utc::now()).unwrap();

        let mut again = new_job(owner, "report", "/tmp/b.pdf");
        again.webhook_url = "http://hooks.local/second".to_string();
        again.correction_requested = true;
        let stale = resubmit(&db, id, &again).unwrap();
        assert!(stale.is_none());

        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Pending);
        assert_eq!(row.attempt, 2);
        assert_eq!(row.source_file_path, Some(PathBuf::from("/tmp/b.pdf")));
        assert_eq!(row.webhook_url, "http://hooks.local/second");
        assert!(row.correction_requested);
        assert!(row.error_message.is_none());
        assert!(row.completed_at.is_none());
        assert_eq!(list_by_owner(&db, owner).unwrap().len(), 1);
    }

    #[test]
    fn test_resubmit_of_pending_job_hands_back_old_source() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();

        let stale = resubmit(&db, id, &new_job(owner, "report", "/tmp/b.pdf")).unwrap();
        assert_eq!(stale, Some(PathBuf::from("/tmp/a.pdf")));
    }

    #[test]
    fn test_superseded_attempt_cannot_finish() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();
        mark_processing(&db, id, 1).unwrap();

        resubmit(&db, id, &new_job(owner, "report", "/tmp/b.pdf")).unwrap();

        assert!(!mark_success(&db, id, 1, Path::new("/old.txt"), &Utc::now()).unwrap());
        let row = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Pending);
        assert!(row.result_file_path.is_none());
    }

    #[test]
    fn test_list_by_owner_newest_first() {
        let (db, owner) = test_db();
        let t0 = Utc::now();
        let first = insert(&db, &new_job(owner, "first", "/tmp/1.pdf"), &t0).unwrap();
        let second = insert(
            &db,
            &new_job(owner, "second", "/tmp/2.pdf"),
            &(t0 + chrono::Duration::seconds(5)),
        )
        .unwrap();

        let ids: Vec<JobId> = list_by_owner(&db, owner)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_update_overwrites_fields() {
        let (db, owner) = test_db();
        let id = insert(&db, &new_job(owner, "report", "/tmp/a.pdf"), &Utc::now()).unwrap();
        let mut row = find_by_id(&db, id).unwrap().unwrap();
        row.status = JobStatus::Error;
        row.error_message = Some("manual".to_string());
        row.completed_at = Some(Utc::now());
        update(&db, &row).unwrap();

        let reread = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(reread.status, JobStatus::Error);
        assert_eq!(reread.error_message.as_deref(), Some("manual"));
    }
}
