//! Worker plumbing that runs a Cella engine off the caller's thread.

pub mod command;
pub mod worker;

pub use command::{WorkerCommand, WorkerEvent};
pub use worker::{
    DEFAULT_MAX_PENDING_UPDATES, WORKER_THREAD_NAME, WorkerError, WorkerHandle, WorkerSettings,
};
