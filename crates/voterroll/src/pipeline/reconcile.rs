//! Metadata reconciler: corrects a job's location after upload.

use serde::Serialize;

use crate::db::{booth_repo, job_repo, now_timestamp, voter_repo, Database};
use crate::error::{ImportError, Result};
use crate::worker::{JobLocation, JobStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub job_id: i64,
    /// Voter records rewritten. Zero unless the job was COMPLETED.
    pub voters_updated: usize,
}

/// Rewrites the job's location and, for a COMPLETED job, every voter
/// record tagged with it. Both writes commit together.
///
/// Jobs that are not yet COMPLETED only get the job row updated; the
/// processor reads the current row when it writes voters.
pub fn update_location(db: &Database, job_id: i64, location: JobLocation) -> Result<ReconcileOutcome> {
    let location = location.normalized();
    let now = now_timestamp();

    let (assembly_id, voters_updated) = db.with_tx(|tx| {
        let Some(job) = job_repo::find_by_id_in(tx, job_id)? else {
            return Ok(None);
        };
        job_repo::update_location_in(tx, job_id, &location.to_row(), &now)?;

        let mut updated = 0;
        if job.status == JobStatus::Completed.as_str() {
            let area = location.derived_area();
            updated = voter_repo::sync_households_in(tx, job_id, |conn| {
                voter_repo::cascade_location_in(
                    conn,
                    job_id,
                    location.booth_number,
                    &location.village(),
                    area.as_deref(),
                )
            })?;
        }
        Ok(Some((job.assembly_id, updated)))
    })?
    .ok_or(ImportError::NotFound(job_id))?;

    if let Some(booth_number) = location.booth_number {
        let area = location.derived_area();
        if let Err(e) = booth_repo::upsert(
            db,
            booth_number,
            assembly_id,
            location.booth_name.as_deref(),
            area.as_deref(),
            &now,
        ) {
            log::warn!("Booth {} of assembly {} could not be updated: {}", booth_number, assembly_id, e);
        }
    }

    log::info!(
        "Updated location of import job {} ({} voter record(s) rewritten)",
        job_id,
        voters_updated
    );

    Ok(ReconcileOutcome {
        job_id,
        voters_updated,
    })
}
