pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod server;
pub mod storage;
pub mod worker;

pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, ExtractError, ImportError, Result, StorageError};
pub use pipeline::{ImportService, IntakeReceipt, IntakeRequest, JobSummary, UploadedDocument};
pub use processor::{ExtractedVoter, PageRange, SubprocessExtractor, VoterExtractor};
pub use storage::UploadStore;
pub use worker::{ImportJob, JobLocation, JobStatus, QueueProcessor, RecoveryMonitor};
