use serde::Serialize;

use crate::db::voter_repo::{self, VillageCount};
use crate::db::{job_repo, Database};
use crate::error::Result;
use crate::worker::{ImportJob, JobStatus};

/// Jobs returned by one listing call.
pub const LIST_LIMIT: u32 = 50;

/// A job as shown to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    #[serde(flatten)]
    pub job: ImportJob,
    /// Villages found in the job's voter records; COMPLETED jobs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_villages: Option<Vec<VillageCount>>,
}

/// Most recent jobs first, COMPLETED ones annotated with village counts.
pub fn recent_jobs(db: &Database) -> Result<Vec<JobSummary>> {
    let rows = job_repo::list_recent(db, LIST_LIMIT)?;
    let mut summaries = Vec::with_capacity(rows.len());
    for row in &rows {
        let job = ImportJob::from_row(row)?;
        let detected_villages = if job.status == JobStatus::Completed {
            Some(voter_repo::village_counts(db, job.id)?)
        } else {
            None
        };
        summaries.push(JobSummary {
            job,
            detected_villages,
        });
    }
    Ok(summaries)
}
