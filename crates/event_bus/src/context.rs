//! Execution-context capability consumed by handlers.
//!
//! The bus never owns threads or queues. A handler bound to an
//! [`ExecutionContext`] runs inline when the publisher is already on that
//! context, and is otherwise handed over as a [`Task`] and forgotten.
//! Concrete contexts live in the `event_scheduler` crate.

/// A deferred, zero-argument unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere a handler can be made to run later.
pub trait ExecutionContext: Send + Sync {
    /// Whether the calling thread/task is already running on this context.
    fn in_context(&self) -> bool;

    /// Enqueues `task` for eventual execution on this context.
    ///
    /// The bus observes no result. Failures inside the task are the
    /// context's concern.
    fn execute(&self, task: Task);

    /// Name used in logs.
    fn name(&self) -> &str {
        "execution-context"
    }
}
