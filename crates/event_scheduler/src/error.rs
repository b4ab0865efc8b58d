use std::thread::ThreadId;
use thiserror::Error;

/// Errors raised while setting up or driving an execution context.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler '{name}' is already bound to thread {owner:?}")]
    AlreadyBound { name: String, owner: ThreadId },
    #[error("Scheduler '{name}' can only process tasks on its own thread")]
    WrongThread { name: String },
    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
