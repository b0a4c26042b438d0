//! Recovery monitor.
//!
//! Gets the queue processor running again after a restart. Runs on demand
//! (every job listing) and on a fixed interval in the background; each
//! periodic scan also applies the retention policy for FAILED documents.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::db::{job_repo, Database, DatabaseError};
use crate::storage::UploadStore;
use crate::worker::queue::{window_start, QueueProcessor};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct RecoveryMonitor {
    db: Database,
    processor: QueueProcessor,
    uploads: UploadStore,
    interval: Duration,
    failed_retention: Option<Duration>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl RecoveryMonitor {
    pub fn new(
        db: Database,
        processor: QueueProcessor,
        uploads: UploadStore,
        interval: Duration,
        failed_retention: Option<Duration>,
    ) -> Self {
        Self {
            db,
            processor,
            uploads,
            interval,
            failed_retention,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn from_config(
        db: Database,
        processor: QueueProcessor,
        uploads: UploadStore,
        config: &QueueConfig,
    ) -> Self {
        Self::new(
            db,
            processor,
            uploads,
            config.recovery_interval(),
            config.failed_retention(),
        )
    }

    /// Triggers the processor if any job is PENDING or PROCESSING.
    ///
    /// PROCESSING counts as work: after a restart nothing is running it,
    /// and the processor's own orphan recovery decides whether to reclaim.
    /// Returns true if active jobs were found.
    pub fn check(&self) -> Result<bool, DatabaseError> {
        let active = job_repo::count_active(&self.db)?;
        if active == 0 {
            return Ok(false);
        }
        if self.processor.trigger() {
            log::info!("Recovery check found {} active job(s); processor started", active);
        }
        Ok(true)
    }

    /// Removes documents of FAILED jobs older than the retention window.
    ///
    /// Job rows are left in place. Returns the number of files removed.
    pub fn sweep_failed_files(&self) -> Result<usize, DatabaseError> {
        let Some(retention) = self.failed_retention else {
            return Ok(0);
        };
        let Some(cutoff) = window_start(retention) else {
            log::debug!("Failed-document retention reaches before the epoch; nothing expires");
            return Ok(0);
        };

        let mut removed = 0;
        for job in job_repo::failed_before(&self.db, &cutoff)? {
            match self.uploads.remove(Path::new(&job.file_path)) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Could not remove document of failed job {}: {}", job.id, e),
            }
        }
        if removed > 0 {
            log::info!("Removed {} expired document(s) of failed jobs", removed);
        }
        Ok(removed)
    }

    /// One periodic pass: recovery check, then retention sweep.
    pub fn scan(&self) {
        if let Err(e) = self.check() {
            log::error!("Recovery check failed: {}", e);
        }
        if let Err(e) = self.sweep_failed_files() {
            log::error!("Failed-document sweep failed: {}", e);
        }
    }

    /// Starts the periodic scan on the current tokio runtime.
    ///
    /// The first scan runs immediately so work left over from a previous
    /// process is picked up at startup.
    pub fn start(&self) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(monitor.interval.max(MIN_INTERVAL));
            loop {
                if monitor.shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = timer.tick() => {},
                    _ = monitor.wake.notified() => {},
                }

                if monitor.shutdown.load(Ordering::Acquire) {
                    break;
                }

                monitor.scan();
            }
            log::debug!("Recovery monitor stopped");
        })
    }

    /// Signals the periodic scan to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}
