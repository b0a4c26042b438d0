//! Test harness for isolated pipeline runs.
//!
//! Every harness owns its own temp directory holding the upload queue and
//! a SQLite file, so a "restart" can open a second service on the same
//! state.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use voterroll::config::Config;
use voterroll::db::job_repo::{self, JobRow};
use voterroll::processor::parse_worker_output;
use voterroll::{
    Database, ExtractError, ExtractedVoter, ImportService, IntakeReceipt, IntakeRequest,
    PageRange, VoterExtractor,
};

/// One scripted reply of the fake OCR worker.
#[derive(Debug, Clone)]
pub enum Scripted {
    Voters(Vec<ExtractedVoter>),
    /// Raw worker stdout, parsed like the real adapter does.
    Stdout(String),
    /// Non-zero exit with this diagnostic text.
    Crash(String),
}

/// Extractor that answers from a queue of scripted replies in call order.
///
/// With a gate installed, each call waits for one permit before replying.
#[derive(Default)]
pub struct ScriptedExtractor {
    replies: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedExtractor {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn push(&self, reply: Scripted) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoterExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        _file_path: &Path,
        _pages: PageRange,
    ) -> Result<Vec<ExtractedVoter>, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(Vec::new()),
            Some(Scripted::Voters(voters)) => Ok(voters),
            Some(Scripted::Stdout(stdout)) => parse_worker_output(&stdout),
            Some(Scripted::Crash(stderr)) => Err(ExtractError::Subprocess {
                status: "exit status: 1".to_string(),
                stderr,
            }),
        }
    }
}

/// Test harness providing an isolated pipeline.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub extractor: Arc<ScriptedExtractor>,
    pub service: ImportService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_extractor(ScriptedExtractor::default())
    }

    pub fn with_extractor(extractor: ScriptedExtractor) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config {
            database_path: Some(temp_dir.path().join("voterroll.db")),
            upload_directory: temp_dir.path().join("pdf_queue"),
            ..Config::default()
        };
        let extractor = Arc::new(extractor);
        let service = Self::open_service(&config, extractor.clone());

        Self {
            temp_dir,
            config,
            extractor,
            service,
        }
    }

    fn open_service(config: &Config, extractor: Arc<ScriptedExtractor>) -> ImportService {
        let db = Database::open(&config.resolved_database_path()).expect("Failed to open database");
        ImportService::from_config(config, db, extractor)
    }

    /// A fresh service on the same database and upload directory, as a
    /// restarted process would see it.
    pub fn restart(&self) -> ImportService {
        Self::open_service(&self.config, self.extractor.clone())
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.config.upload_directory.clone()
    }

    pub fn db(&self) -> &Database {
        self.service.database()
    }

    pub fn submit(&self, request: &IntakeRequest) -> IntakeReceipt {
        self.service.submit(request).expect("intake failed")
    }

    pub fn job(&self, id: i64) -> JobRow {
        job_repo::find_by_id(self.db(), id)
            .unwrap()
            .expect("job not found")
    }

    /// Waits until the given service's processor has gone idle.
    pub async fn wait_idle(service: &ImportService) {
        for _ in 0..500 {
            if !service.processor().is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue processor did not finish");
    }

    /// Waits until `job` reaches `status`.
    pub async fn wait_for_status(&self, id: i64, status: &str) {
        for _ in 0..500 {
            if self.job(id).status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}, is {}", id, status, self.job(id).status);
    }
}
