pub mod job;
pub mod queue;
pub mod recovery;

pub use job::{ImportJob, JobLocation, JobStatus};
pub use queue::{DrainReport, JobOutcome, QueueProcessor, QueueSettings};
pub use recovery::RecoveryMonitor;
