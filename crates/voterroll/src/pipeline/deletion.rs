use std::path::PathBuf;

use serde::Serialize;

use crate::db::{job_repo, voter_repo, Database};
use crate::error::{ImportError, Result};
use crate::sanitize::redact_path;
use crate::storage::UploadStore;
use crate::worker::JobStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReceipt {
    pub job_id: i64,
    pub voters_deleted: usize,
}

/// Deletes a job, its voter records and its document.
///
/// A PROCESSING job is refused with `Conflict`. The row and its voters go
/// in one transaction; the document is removed after commit, and an
/// already-missing document is not an error.
pub fn delete_job(db: &Database, uploads: &UploadStore, job_id: i64) -> Result<DeletionReceipt> {
    let (file_path, voters_deleted) = db
        .with_tx(|tx| {
            let Some(job) = job_repo::find_by_id_in(tx, job_id)? else {
                return Ok(Err(ImportError::NotFound(job_id)));
            };
            if job.status == JobStatus::Processing.as_str() {
                return Ok(Err(ImportError::conflict(format!(
                    "import job {} is being processed and cannot be deleted",
                    job_id
                ))));
            }

            let voters = voter_repo::sync_households_in(tx, job_id, |conn| {
                voter_repo::delete_by_job_in(conn, job_id)
            })?;
            job_repo::delete_in(tx, job_id)?;
            Ok(Ok((PathBuf::from(job.file_path), voters)))
        })??;

    match uploads.remove(&file_path) {
        Ok(true) => {}
        Ok(false) => log::debug!(
            "Document {} of job {} was already gone",
            redact_path(&file_path),
            job_id
        ),
        Err(e) => log::warn!("Job {} deleted but its document remains: {}", job_id, e),
    }

    log::info!(
        "Deleted import job {} and {} voter record(s)",
        job_id,
        voters_deleted
    );

    Ok(DeletionReceipt {
        job_id,
        voters_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::NewJobRow;
    use crate::db::now_timestamp;
    use crate::db::voter_repo::NewVoterRow;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database, UploadStore) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let uploads = UploadStore::new(dir.path());
        (dir, db, uploads)
    }

    fn job_with_voters(db: &Database, uploads: &UploadStore, voters: usize) -> (i64, PathBuf) {
        let stored = uploads.persist("roll.pdf", b"%PDF").unwrap();
        let now = now_timestamp();
        let id = job_repo::insert(
            db,
            &NewJobRow {
                file_name: "roll.pdf".to_string(),
                file_path: stored.path.to_string_lossy().into_owned(),
                assembly_id: 7,
                created_at: now.clone(),
                ..Default::default()
            },
        )
        .unwrap();
        db.with_tx(|tx| {
            let rows: Vec<NewVoterRow> = (0..voters)
                .map(|i| NewVoterRow {
                    assembly_id: 7,
                    import_job_id: Some(id),
                    name: format!("Voter {}", i),
                    ..Default::default()
                })
                .collect();
            voter_repo::insert_batch_in(tx, &rows, &now)?;
            tx.execute(
                "UPDATE import_jobs SET status = 'COMPLETED' WHERE id = ?1",
                [id],
            )?;
            Ok(())
        })
        .unwrap();
        (id, stored.path)
    }

    #[test]
    fn test_delete_completed_job_removes_exactly_its_voters() {
        let (_dir, db, uploads) = setup();
        let (job, path) = job_with_voters(&db, &uploads, 5);
        let (other, _) = job_with_voters(&db, &uploads, 2);

        let receipt = delete_job(&db, &uploads, job).unwrap();
        assert_eq!(receipt.voters_deleted, 5);
        assert!(job_repo::find_by_id(&db, job).unwrap().is_none());
        assert_eq!(voter_repo::count_by_job(&db, job).unwrap(), 0);
        assert_eq!(voter_repo::count_by_job(&db, other).unwrap(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn test_processing_job_is_refused() {
        let (_dir, db, uploads) = setup();
        let stored = uploads.persist("roll.pdf", b"%PDF").unwrap();
        let id = job_repo::insert(
            &db,
            &NewJobRow {
                file_name: "roll.pdf".to_string(),
                file_path: stored.path.to_string_lossy().into_owned(),
                assembly_id: 7,
                created_at: now_timestamp(),
                ..Default::default()
            },
        )
        .unwrap();
        job_repo::claim(&db, id, "worker", &now_timestamp()).unwrap();

        let err = delete_job(&db, &uploads, id).unwrap_err();
        assert!(matches!(err, ImportError::Conflict(_)));
        assert!(job_repo::find_by_id(&db, id).unwrap().is_some());
        assert!(stored.path.exists());
    }

    #[test]
    fn test_missing_document_is_tolerated() {
        let (_dir, db, uploads) = setup();
        let (job, path) = job_with_voters(&db, &uploads, 1);
        std::fs::remove_file(&path).unwrap();

        let receipt = delete_job(&db, &uploads, job).unwrap();
        assert_eq!(receipt.voters_deleted, 1);
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let (_dir, db, uploads) = setup();
        let err = delete_job(&db, &uploads, 99).unwrap_err();
        assert!(matches!(err, ImportError::NotFound(99)));
    }
}
