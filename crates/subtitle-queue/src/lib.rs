//! Asynchronous job queue: enqueue/fetch/stats contract over a Redis
//! stream, with consumer-group mechanics for worker processes.

pub mod config;
pub mod error;
pub mod job;
pub mod queue;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use job::{EnqueueOptions, JobRecord, QueueItem, QueueJobStatus, QueueStats};
pub use queue::JobQueue;
