//! State transitions and queries for the `import_jobs` table.
//!
//! Every status change is a single conditional `UPDATE` whose `WHERE`
//! clause encodes the expected current state; callers learn whether the
//! transition happened from the affected-row count.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    pub assembly_id: i64,
    pub status: String,
    pub progress: i64,
    pub booth_number: Option<i64>,
    pub booth_name: Option<String>,
    pub common_address: Option<String>,
    pub expected_voters: Option<i64>,
    pub start_page: Option<i64>,
    pub end_page: Option<i64>,
    pub total_voters: Option<i64>,
    pub error_message: Option<String>,
    pub message: Option<String>,
    pub claimed_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            assembly_id: row.get("assembly_id")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            booth_number: row.get("booth_number")?,
            booth_name: row.get("booth_name")?,
            common_address: row.get("common_address")?,
            expected_voters: row.get("expected_voters")?,
            start_page: row.get("start_page")?,
            end_page: row.get("end_page")?,
            total_voters: row.get("total_voters")?,
            error_message: row.get("error_message")?,
            message: row.get("message")?,
            claimed_by: row.get("claimed_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Values for a job about to be created. The id is assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewJobRow {
    pub file_name: String,
    pub file_path: String,
    pub assembly_id: i64,
    pub booth_number: Option<i64>,
    pub booth_name: Option<String>,
    pub common_address: Option<String>,
    pub expected_voters: Option<i64>,
    pub start_page: Option<i64>,
    pub end_page: Option<i64>,
    pub created_at: String,
}

/// Location fields the reconciler may rewrite.
#[derive(Debug, Clone, Default)]
pub struct LocationRow {
    pub booth_number: Option<i64>,
    pub booth_name: Option<String>,
    pub common_address: Option<String>,
}

/// Inserts a new PENDING job and returns its id.
pub fn insert_in(conn: &Connection, job: &NewJobRow) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO import_jobs (file_name, file_path, assembly_id, status, progress,
         booth_number, booth_name, common_address, expected_voters, start_page, end_page,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, 'PENDING', 0, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            job.file_name,
            job.file_path,
            job.assembly_id,
            job.booth_number,
            job.booth_name,
            job.common_address,
            job.expected_voters,
            job.start_page,
            job.end_page,
            job.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Inserts a new PENDING job and returns its id.
pub fn insert(db: &Database, job: &NewJobRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| insert_in(conn, job))
}

/// Finds a job by its ID on an already-locked connection.
pub fn find_by_id_in(conn: &Connection, id: i64) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM import_jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| find_by_id_in(conn, id))
}

/// Returns the most recent jobs, newest first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM import_jobs ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt
            .query_map(params![limit], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns the oldest PENDING job, if any.
pub fn next_pending(db: &Database) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM import_jobs WHERE status = 'PENDING'
                 ORDER BY created_at ASC, id ASC LIMIT 1",
                [],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns true when at least one job is PENDING.
pub fn has_pending(db: &Database) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM import_jobs WHERE status = 'PENDING')",
            [],
            |r| r.get(0),
        )?;
        Ok(exists)
    })
}

/// Counts jobs that still need work (PENDING or PROCESSING).
pub fn count_active(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM import_jobs WHERE status IN ('PENDING', 'PROCESSING')",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM import_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Claims a PENDING job for `owner`. Returns false if the job was no
/// longer PENDING at the moment of the update.
pub fn claim(db: &Database, id: i64, owner: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs
             SET status = 'PROCESSING', progress = 5, claimed_by = ?2, error_message = NULL,
                 updated_at = ?3
             WHERE id = ?1 AND status = 'PENDING'",
            params![id, owner, now],
        )?;
        Ok(changed == 1)
    })
}

/// Refreshes `updated_at` on a job still claimed by `owner`.
pub fn heartbeat(db: &Database, id: i64, owner: &str, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs SET updated_at = ?3
             WHERE id = ?1 AND status = 'PROCESSING' AND claimed_by = ?2",
            params![id, owner, now],
        )?;
        Ok(changed == 1)
    })
}

/// Marks a job COMPLETED if it is still claimed by `owner`.
pub fn complete_in(
    conn: &Connection,
    id: i64,
    owner: &str,
    total_voters: i64,
    message: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE import_jobs
         SET status = 'COMPLETED', progress = 100, total_voters = ?3, message = ?4,
             error_message = NULL, updated_at = ?5, completed_at = ?5
         WHERE id = ?1 AND status = 'PROCESSING' AND claimed_by = ?2",
        params![id, owner, total_voters, message, now],
    )?;
    Ok(changed == 1)
}

/// Marks a job FAILED with a reason if it is still claimed by `owner`.
pub fn fail(
    db: &Database,
    id: i64,
    owner: &str,
    reason: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs
             SET status = 'FAILED', error_message = ?3, message = 'Import failed',
                 updated_at = ?4, completed_at = ?4
             WHERE id = ?1 AND status = 'PROCESSING' AND claimed_by = ?2",
            params![id, owner, reason, now],
        )?;
        Ok(changed == 1)
    })
}

/// Operator reset: puts any job back to PENDING with progress 0.
pub fn reset(db: &Database, id: i64, now: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs
             SET status = 'PENDING', progress = 0, claimed_by = NULL, error_message = NULL,
                 message = NULL, total_voters = NULL, completed_at = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Returns PROCESSING jobs to PENDING when their claim is orphaned.
///
/// A claim is orphaned when it belongs to `owner` (the caller holds the
/// only live loop of that instance, so nothing of its own can be in
/// flight) or when its last heartbeat is at or before `stale_cutoff`.
/// Without a cutoff only the caller's own claims are recovered.
pub fn recover_orphaned(
    db: &Database,
    owner: &str,
    stale_cutoff: Option<&str>,
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE import_jobs
             SET status = 'PENDING', progress = 0, claimed_by = NULL, updated_at = ?3
             WHERE status = 'PROCESSING'
               AND (claimed_by = ?1 OR (?2 IS NOT NULL AND updated_at <= ?2))",
            params![owner, stale_cutoff, now],
        )?;
        Ok(changed)
    })
}

/// Rewrites a job's location fields. Returns false if the job is gone.
pub fn update_location_in(
    conn: &Connection,
    id: i64,
    location: &LocationRow,
    now: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE import_jobs
         SET booth_number = ?2, booth_name = ?3, common_address = ?4, updated_at = ?5
         WHERE id = ?1",
        params![
            id,
            location.booth_number,
            location.booth_name,
            location.common_address,
            now
        ],
    )?;
    Ok(changed == 1)
}

/// Deletes a job row unless it is PROCESSING.
pub fn delete_in(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM import_jobs WHERE id = ?1 AND status != 'PROCESSING'",
        params![id],
    )?;
    Ok(changed == 1)
}

/// FAILED jobs that finished at or before `cutoff`.
pub fn failed_before(db: &Database, cutoff: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM import_jobs WHERE status = 'FAILED' AND completed_at <= ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![cutoff], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
