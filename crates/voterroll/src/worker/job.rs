use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::{JobRow, LocationRow};
use crate::db::{parse_timestamp, DatabaseError};
use crate::processor::PageRange;

/// Lifecycle state of an import job.
///
/// `Pending -> Processing -> {Completed, Failed}`. Processing goes back to
/// Pending only through recovery or an operator reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// True for states the queue still has to act on.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booth and address a job's voters belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLocation {
    pub booth_number: Option<i64>,
    pub booth_name: Option<String>,
    pub common_address: Option<String>,
}

impl JobLocation {
    /// Blank strings are treated as absent.
    pub fn normalized(self) -> Self {
        Self {
            booth_number: self.booth_number,
            booth_name: non_blank(self.booth_name),
            common_address: non_blank(self.common_address),
        }
    }

    /// Booth name and common address joined with `", "`.
    pub fn derived_area(&self) -> Option<String> {
        let parts: Vec<&str> = [self.booth_name.as_deref(), self.common_address.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }

    /// Village recorded on voters: the booth name, or empty.
    pub fn village(&self) -> String {
        self.booth_name
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }

    pub(crate) fn to_row(&self) -> LocationRow {
        LocationRow {
            booth_number: self.booth_number,
            booth_name: self.booth_name.clone(),
            common_address: self.common_address.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// An import job as the rest of the crate sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: i64,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub file_path: PathBuf,
    pub assembly_id: i64,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(flatten)]
    pub location: JobLocation,
    pub expected_voters: Option<i64>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
    pub total_voters: Option<i64>,
    pub error_message: Option<String>,
    pub message: Option<String>,
    #[serde(skip_serializing)]
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn from_row(row: &JobRow) -> Result<Self, DatabaseError> {
        let status = JobStatus::parse(&row.status).ok_or_else(|| DatabaseError::InvalidRow {
            table: "import_jobs",
            reason: format!("job {} has unknown status '{}'", row.id, row.status),
        })?;

        Ok(Self {
            id: row.id,
            file_name: row.file_name.clone(),
            file_path: PathBuf::from(&row.file_path),
            assembly_id: row.assembly_id,
            status,
            progress: row.progress.clamp(0, 100) as u8,
            location: JobLocation {
                booth_number: row.booth_number,
                booth_name: row.booth_name.clone(),
                common_address: row.common_address.clone(),
            },
            expected_voters: row.expected_voters,
            start_page: row.start_page.and_then(|p| u32::try_from(p).ok()),
            end_page: row.end_page.and_then(|p| u32::try_from(p).ok()),
            total_voters: row.total_voters,
            error_message: row.error_message.clone(),
            message: row.message.clone(),
            claimed_by: row.claimed_by.clone(),
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            completed_at: row
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }

    pub fn page_range(&self) -> PageRange {
        PageRange::new(self.start_page, self.end_page)
    }
}
