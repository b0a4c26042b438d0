//! File intake: stores uploaded documents and queues one job per document.

use serde::Serialize;

use crate::db::job_repo::{self, NewJobRow};
use crate::db::{booth_repo, now_timestamp, Database};
use crate::error::{ImportError, Result};
use crate::processor::PageRange;
use crate::storage::{StoredUpload, UploadStore};
use crate::worker::JobLocation;

/// One document as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// A batch of documents sharing the same assembly and location.
#[derive(Debug, Clone, Default)]
pub struct IntakeRequest {
    pub documents: Vec<UploadedDocument>,
    pub assembly_id: Option<i64>,
    pub location: JobLocation,
    pub expected_voters: Option<i64>,
    pub pages: PageRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeReceipt {
    pub jobs_created: usize,
    pub job_ids: Vec<i64>,
}

/// Checks the request and returns its assembly id.
fn validate(request: &IntakeRequest) -> Result<i64> {
    if request.documents.is_empty() {
        return Err(ImportError::validation("at least one document is required"));
    }
    let assembly_id = match request.assembly_id {
        Some(id) if id > 0 => id,
        Some(id) => {
            return Err(ImportError::validation(format!(
                "assemblyId must be positive, got {}",
                id
            )))
        }
        None => return Err(ImportError::validation("assemblyId is required")),
    };
    if let Some(expected) = request.expected_voters {
        if expected < 0 {
            return Err(ImportError::validation("expectedVoters must not be negative"));
        }
    }
    request.pages.check().map_err(ImportError::Validation)?;
    Ok(assembly_id)
}

/// Persists every document, then creates all jobs in one transaction.
///
/// Nothing is queued unless every document was stored; files written
/// before a failure are removed again.
pub fn submit(db: &Database, uploads: &UploadStore, request: &IntakeRequest) -> Result<IntakeReceipt> {
    let assembly_id = validate(request)?;
    let location = request.location.clone().normalized();

    let mut stored: Vec<StoredUpload> = Vec::with_capacity(request.documents.len());
    for document in &request.documents {
        match uploads.persist(&document.file_name, &document.bytes) {
            Ok(upload) => stored.push(upload),
            Err(e) => {
                discard(uploads, &stored);
                return Err(e.into());
            }
        }
    }

    let now = now_timestamp();
    let inserted = db.with_tx(|tx| {
        stored
            .iter()
            .map(|upload| {
                job_repo::insert_in(
                    tx,
                    &NewJobRow {
                        file_name: upload.original_name.clone(),
                        file_path: upload.path.to_string_lossy().into_owned(),
                        assembly_id,
                        booth_number: location.booth_number,
                        booth_name: location.booth_name.clone(),
                        common_address: location.common_address.clone(),
                        expected_voters: request.expected_voters,
                        start_page: request.pages.start.map(i64::from),
                        end_page: request.pages.end.map(i64::from),
                        created_at: now.clone(),
                    },
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()
    });
    let job_ids = match inserted {
        Ok(ids) => ids,
        Err(e) => {
            discard(uploads, &stored);
            return Err(e.into());
        }
    };

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
            log::warn!(
                "Booth {} of assembly {} could not be updated: {}",
                booth_number,
                assembly_id,
                e
            );
        }
    }

    log::info!(
        "Queued {} import job(s) for assembly {}",
        job_ids.len(),
        assembly_id
    );

    Ok(IntakeReceipt {
        jobs_created: job_ids.len(),
        job_ids,
    })
}

fn discard(uploads: &UploadStore, stored: &[StoredUpload]) {
    for upload in stored {
        if let Err(e) = uploads.remove(&upload.path) {
            log::warn!("Could not remove abandoned upload: {}", e);
        }
    }
}
