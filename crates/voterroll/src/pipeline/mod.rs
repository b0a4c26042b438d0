//! Import pipeline entry points.
//!
//! [`ImportService`] is what request handlers and the CLI talk to. It owns
//! the store, the upload directory, the queue processor and the recovery
//! monitor, and fires processor triggers after state changes.

pub mod deletion;
pub mod intake;
pub mod listing;
pub mod reconcile;

use std::sync::Arc;

use crate::config::Config;
use crate::db::{job_repo, now_timestamp, Database};
use crate::error::{ImportError, Result};
use crate::processor::VoterExtractor;
use crate::storage::UploadStore;
use crate::worker::{ImportJob, JobLocation, QueueProcessor, QueueSettings, RecoveryMonitor};

pub use deletion::DeletionReceipt;
pub use intake::{IntakeReceipt, IntakeRequest, UploadedDocument};
pub use listing::JobSummary;
pub use reconcile::ReconcileOutcome;

#[derive(Clone)]
pub struct ImportService {
    db: Database,
    uploads: UploadStore,
    processor: QueueProcessor,
    recovery: RecoveryMonitor,
}

impl ImportService {
    pub fn new(
        db: Database,
        uploads: UploadStore,
        processor: QueueProcessor,
        recovery: RecoveryMonitor,
    ) -> Self {
        Self {
            db,
            uploads,
            processor,
            recovery,
        }
    }

    /// Wires a service from configuration around the given extractor.
    pub fn from_config(config: &Config, db: Database, extractor: Arc<dyn VoterExtractor>) -> Self {
        let uploads = UploadStore::new(&config.upload_directory);
        let processor = QueueProcessor::new(
            db.clone(),
            extractor,
            uploads.clone(),
            QueueSettings::from_config(&config.queue),
        );
        let recovery =
            RecoveryMonitor::from_config(db.clone(), processor.clone(), uploads.clone(), &config.queue);
        Self::new(db, uploads, processor, recovery)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn processor(&self) -> &QueueProcessor {
        &self.processor
    }

    pub fn recovery(&self) -> &RecoveryMonitor {
        &self.recovery
    }

    /// Stores the documents, queues one job each, and starts the processor.
    pub fn submit(&self, request: &IntakeRequest) -> Result<IntakeReceipt> {
        let receipt = intake::submit(&self.db, &self.uploads, request)?;
        self.processor.trigger();
        Ok(receipt)
    }

    /// Recent jobs. Runs a recovery check first so that jobs left over
    /// from a previous process get picked up.
    pub fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        if let Err(e) = self.recovery.check() {
            log::warn!("Recovery check during listing failed: {}", e);
        }
        listing::recent_jobs(&self.db)
    }

    /// Starts the processor. Returns false if it was already running.
    pub fn trigger_processing(&self) -> bool {
        self.processor.trigger()
    }

    pub fn update_job(&self, job_id: i64, location: JobLocation) -> Result<ReconcileOutcome> {
        reconcile::update_location(&self.db, job_id, location)
    }

    pub fn delete_job(&self, job_id: i64) -> Result<DeletionReceipt> {
        deletion::delete_job(&self.db, &self.uploads, job_id)
    }

    /// Operator reset: the job goes back to PENDING whatever its state,
    /// and the processor is started.
    pub fn reset_job(&self, job_id: i64) -> Result<ImportJob> {
        let job = self.requeue_job(job_id)?;
        self.processor.trigger();
        Ok(job)
    }

    /// Puts the job back to PENDING without starting this process's
    /// processor. For short-lived callers that leave the drain to a
    /// long-running server.
    pub fn requeue_job(&self, job_id: i64) -> Result<ImportJob> {
        if !job_repo::reset(&self.db, job_id, &now_timestamp())? {
            return Err(ImportError::NotFound(job_id));
        }
        log::info!("Import job {} reset to PENDING", job_id);

        let row = job_repo::find_by_id(&self.db, job_id)?.ok_or(ImportError::NotFound(job_id))?;
        Ok(ImportJob::from_row(&row)?)
    }
}
