//! Single-flight queue processor.
//!
//! One loop per process drains PENDING jobs oldest-first. The in-memory
//! `running` flag keeps a second loop from starting inside this process;
//! the conditional claim in `job_repo::claim` keeps two processes from
//! working on the same job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::db::job_repo::{self, JobRow};
use crate::db::voter_repo::{self, NewVoterRow};
use crate::db::{format_timestamp, now_timestamp, Database, DatabaseError};
use crate::error::ExtractError;
use crate::processor::{ExtractedVoter, VoterExtractor};
use crate::sanitize::redact_path;
use crate::storage::UploadStore;
use crate::worker::job::{ImportJob, JobLocation};

const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

/// Timing and retention knobs for the processor.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub heartbeat: Duration,
    pub stale_after: Duration,
    pub retain_completed_files: bool,
}

impl QueueSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            heartbeat: config.heartbeat(),
            stale_after: config.stale_after(),
            retain_completed_files: config.retain_completed_files,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// What happened to one job during a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { job_id: i64, voters: usize },
    Failed { job_id: i64, reason: String },
    /// Claimed elsewhere, or the claim was lost before results were written.
    Skipped { job_id: i64 },
}

/// Summary of one pass over the queue.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub recovered: usize,
    pub outcomes: Vec<JobOutcome>,
    /// Set when a store error stopped the pass early.
    pub aborted: Option<String>,
}

impl DrainReport {
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Failed { .. }))
            .count()
    }
}

/// Releases the single-flight flag when dropped, including on panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct QueueProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    db: Database,
    extractor: Arc<dyn VoterExtractor>,
    uploads: UploadStore,
    settings: QueueSettings,
    instance_id: String,
    running: Arc<AtomicBool>,
}

impl QueueProcessor {
    pub fn new(
        db: Database,
        extractor: Arc<dyn VoterExtractor>,
        uploads: UploadStore,
        settings: QueueSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                db,
                extractor,
                uploads,
                settings,
                instance_id: Uuid::new_v4().to_string(),
                running: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Identifier written to `claimed_by` for jobs this processor owns.
    pub fn instance_id(&self) -> &str {
        &self.inner.instance_id
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<RunningGuard> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(Arc::clone(&self.inner.running)))
    }

    /// Starts a background drain unless one is already running.
    ///
    /// Returns true if this call started the loop. Safe to call from any
    /// number of request handlers.
    pub fn trigger(&self) -> bool {
        let Some(guard) = self.try_acquire() else {
            log::debug!("Queue processor already running; trigger ignored");
            return false;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("Queue processor triggered outside a tokio runtime; ignored");
                return false;
            }
        };

        let processor = self.clone();
        handle.spawn(async move {
            processor.run_until_idle(guard).await;
        });
        true
    }

    /// Drains the queue on the caller's task. Returns `None` if another
    /// loop already holds the single-flight flag.
    pub async fn run_now(&self) -> Option<DrainReport> {
        let guard = self.try_acquire()?;
        let report = self.drain().await;
        drop(guard);
        Some(report)
    }

    async fn run_until_idle(self, guard: RunningGuard) {
        let mut guard = Some(guard);
        loop {
            let report = self.drain().await;
            log::info!(
                "Queue drained: {} completed, {} failed, {} recovered",
                report.completed(),
                report.failed(),
                report.recovered
            );
            guard.take();

            if report.aborted.is_some() {
                break;
            }

            // A trigger that raced with the release above found the flag
            // still set and returned; pick its job up here.
            match job_repo::has_pending(&self.inner.db) {
                Ok(true) => match self.try_acquire() {
                    Some(next) => guard = Some(next),
                    None => break,
                },
                Ok(false) => break,
                Err(e) => {
                    log::error!("Failed to check for pending import jobs: {}", e);
                    break;
                }
            }
        }
    }

    async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();

        match self.recover_orphaned() {
            Ok(recovered) => report.recovered = recovered,
            Err(e) => log::error!("Orphaned job recovery failed: {}", e),
        }

        loop {
            let row = match job_repo::next_pending(&self.inner.db) {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to fetch next pending import job: {}", e);
                    report.aborted = Some(e.to_string());
                    break;
                }
            };

            match self.process_row(row).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    log::error!("Failed to claim import job: {}", e);
                    report.aborted = Some(e.to_string());
                    break;
                }
            }
        }

        report
    }

    /// Puts orphaned PROCESSING jobs back to PENDING.
    ///
    /// Called with the single-flight flag held, so nothing claimed by
    /// this instance can be in flight. Foreign claims are only taken over
    /// once their heartbeat is older than the staleness window.
    fn recover_orphaned(&self) -> Result<usize, DatabaseError> {
        let cutoff = window_start(self.inner.settings.stale_after);
        if cutoff.is_none() {
            log::debug!("Staleness window reaches before the epoch; only own claims recovered");
        }
        let recovered = job_repo::recover_orphaned(
            &self.inner.db,
            &self.inner.instance_id,
            cutoff.as_deref(),
            &now_timestamp(),
        )?;
        if recovered > 0 {
            log::warn!("Returned {} orphaned import job(s) to PENDING", recovered);
        }
        Ok(recovered)
    }

    /// Claims and runs one job. Only a failed claim is an error; every
    /// other problem is recorded on the job.
    async fn process_row(&self, row: JobRow) -> Result<JobOutcome, DatabaseError> {
        let job_id = row.id;
        let span = tracing::info_span!(
            "import_job",
            job_id,
            file = %redact_path(std::path::Path::new(&row.file_path))
        );

        async move {
            if !job_repo::claim(
                &self.inner.db,
                job_id,
                &self.inner.instance_id,
                &now_timestamp(),
            )? {
                log::info!("Import job {} was claimed by another processor", job_id);
                return Ok(JobOutcome::Skipped { job_id });
            }

            let job = match ImportJob::from_row(&row) {
                Ok(job) => job,
                Err(e) => return Ok(self.fail_job(job_id, e.to_string())),
            };
            Ok(self.run_claimed(job).await)
        }
        .instrument(span)
        .await
    }

    async fn run_claimed(&self, job: ImportJob) -> JobOutcome {
        if !job.file_path.exists() {
            return self.fail_job(
                job.id,
                format!("source file not found: {}", redact_path(&job.file_path)),
            );
        }

        let started = Instant::now();
        let voters = match self.extract_with_heartbeat(&job).await {
            Ok(voters) => voters,
            Err(e) => return self.fail_job(job.id, e.to_string()),
        };

        match self.persist(&job, voters) {
            Ok(Some(count)) => {
                tracing::info!(
                    voters = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Import job completed"
                );
                if let Some(expected) = job.expected_voters {
                    if expected != count as i64 {
                        tracing::warn!(
                            expected,
                            extracted = count,
                            "Extracted voter count differs from expected count"
                        );
                    }
                }
                self.cleanup_completed(&job);
                JobOutcome::Completed {
                    job_id: job.id,
                    voters: count,
                }
            }
            Ok(None) => {
                tracing::warn!("Claim lost before completion; extracted records discarded");
                JobOutcome::Skipped { job_id: job.id }
            }
            Err(e) => self.fail_job(job.id, format!("failed to persist voter records: {}", e)),
        }
    }

    /// Runs the extractor while refreshing the job's claim.
    async fn extract_with_heartbeat(
        &self,
        job: &ImportJob,
    ) -> Result<Vec<ExtractedVoter>, ExtractError> {
        let extraction = self
            .inner
            .extractor
            .extract(&job.file_path, job.page_range());
        tokio::pin!(extraction);

        let mut heartbeat = tokio::time::interval(self.inner.settings.heartbeat.max(MIN_HEARTBEAT));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = &mut extraction => return result,
                _ = heartbeat.tick() => {
                    match job_repo::heartbeat(
                        &self.inner.db,
                        job.id,
                        &self.inner.instance_id,
                        &now_timestamp(),
                    ) {
                        Ok(true) => {}
                        Ok(false) => log::warn!(
                            "Import job {} is no longer claimed by this processor",
                            job.id
                        ),
                        Err(e) => log::warn!("Heartbeat for import job {} failed: {}", job.id, e),
                    }
                }
            }
        }
    }

    /// Writes the job's voters and flips it to COMPLETED in one transaction.
    ///
    /// Location fallbacks come from the job row as it is now, so edits made
    /// while the worker ran are honoured. Returns `None` if the claim was
    /// lost in the meantime; nothing is written in that case.
    fn persist(
        &self,
        job: &ImportJob,
        voters: Vec<ExtractedVoter>,
    ) -> Result<Option<usize>, DatabaseError> {
        let now = now_timestamp();
        let owner = self.inner.instance_id.as_str();

        self.inner.db.with_tx(|tx| {
            let Some(current) = job_repo::find_by_id_in(tx, job.id)? else {
                return Ok(None);
            };
            let location = JobLocation {
                booth_number: current.booth_number,
                booth_name: current.booth_name.clone(),
                common_address: current.common_address.clone(),
            };
            let rows: Vec<NewVoterRow> = voters
                .into_iter()
                .map(|voter| voter_row(&current, &location, voter))
                .collect();

            let message = completion_message(rows.len(), current.expected_voters);
            if !job_repo::complete_in(tx, job.id, owner, rows.len() as i64, &message, &now)? {
                return Ok(None);
            }

            let inserted = voter_repo::sync_households_in(tx, job.id, |conn| {
                // Replacing keeps a reset-and-retry from doubling the job's records.
                let replaced = voter_repo::delete_by_job_in(conn, job.id)?;
                if replaced > 0 {
                    log::info!(
                        "Replacing {} voter record(s) from an earlier run of job {}",
                        replaced,
                        job.id
                    );
                }
                voter_repo::insert_batch_in(conn, &rows, &now)
            })?;
            Ok(Some(inserted))
        })
    }

    fn fail_job(&self, job_id: i64, reason: String) -> JobOutcome {
        tracing::warn!(job_id, reason = %reason, "Import job failed");
        match job_repo::fail(
            &self.inner.db,
            job_id,
            &self.inner.instance_id,
            &reason,
            &now_timestamp(),
        ) {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "Import job {} was no longer claimed; failure not recorded",
                job_id
            ),
            Err(e) => log::error!("Failed to record failure of import job {}: {}", job_id, e),
        }
        JobOutcome::Failed { job_id, reason }
    }

    fn cleanup_completed(&self, job: &ImportJob) {
        if self.inner.settings.retain_completed_files {
            return;
        }
        match self.inner.uploads.remove(&job.file_path) {
            Ok(_) => log::debug!("Removed source document of completed job {}", job.id),
            Err(e) => log::warn!("Could not remove document of job {}: {}", job.id, e),
        }
    }
}

fn voter_row(job: &JobRow, location: &JobLocation, voter: ExtractedVoter) -> NewVoterRow {
    NewVoterRow {
        assembly_id: job.assembly_id,
        import_job_id: Some(job.id),
        epic: voter.epic,
        name: voter.name.unwrap_or_default(),
        relative_name: voter.relative_name,
        relation_type: voter.relation_type,
        house_number: voter.house_number,
        age: voter.age,
        gender: voter.gender,
        booth_number: voter.booth_number.or(location.booth_number),
        village: voter
            .village
            .or_else(|| Some(location.village()).filter(|v| !v.is_empty())),
        area: voter.area.or_else(|| location.derived_area()),
        page_number: voter.page_number,
        box_index: voter.box_index,
    }
}

/// Start of a window of length `window` ending now, in storage format.
///
/// `None` when the window reaches back further than timestamps can go;
/// callers treat that as "nothing is old enough".
pub(crate) fn window_start(window: Duration) -> Option<String> {
    let window = chrono::Duration::from_std(window).ok()?;
    Utc::now().checked_sub_signed(window).map(format_timestamp)
}

fn completion_message(imported: usize, expected: Option<i64>) -> String {
    match expected {
        Some(expected) if expected != imported as i64 => {
            format!("Imported {} voters (expected {})", imported, expected)
        }
        _ => format!("Imported {} voters", imported),
    }
}
