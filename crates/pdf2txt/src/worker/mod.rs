pub mod job;
pub mod pool;

pub use job::{JobId, JobOutcome, JobStatus};
pub use pool::WorkerPool;

pub use crossbeam_channel;
