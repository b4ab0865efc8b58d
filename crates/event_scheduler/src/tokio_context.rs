//! Execution context backed by a tokio runtime.
//!
//! Every task spawned through a [`TokioContext`] runs inside a task-local
//! scope carrying that context's id, which is how `in_context` tells its own
//! tasks apart from everything else on the same runtime.

use crate::error::SchedulerError;
use event_bus::{ExecutionContext, Task};
use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;
use uuid::Uuid;

tokio::task_local! {
    static CONTEXT_ID: Uuid;
}

#[derive(Debug, Clone)]
pub struct TokioContext {
    id: Uuid,
    name: String,
    handle: Handle,
}

impl TokioContext {
    pub fn new(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            handle,
        }
    }

    /// Binds to the runtime of the calling thread.
    pub fn current(name: impl Into<String>) -> Result<Self, SchedulerError> {
        Ok(Self::new(name, Handle::try_current()?))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns `future` on the runtime as a task of this context.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(CONTEXT_ID.scope(self.id, future))
    }
}

impl ExecutionContext for TokioContext {
    fn in_context(&self) -> bool {
        CONTEXT_ID.try_with(|id| *id == self.id).unwrap_or(false)
    }

    /// Runs `task` as a tokio task. Tasks run on runtime worker threads, so
    /// handlers bound here should not block for long.
    fn execute(&self, task: Task) {
        trace!("Spawning deferred task on {}", self.name);
        self.spawn(async move { task() });
    }

    fn name(&self) -> &str {
        &self.name
    }
}
