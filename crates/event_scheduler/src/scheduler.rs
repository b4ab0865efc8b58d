//! # Scheduler
//!
//! A task queue owned by exactly one thread. Any thread may enqueue tasks;
//! only the owning thread drains them, typically once per iteration of its
//! main loop.
//!
//! ```rust
//! use event_scheduler::Scheduler;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! let scheduler = Scheduler::new("main");
//! scheduler.bind_current_thread().unwrap();
//!
//! let ticks = Arc::new(AtomicU32::new(0));
//! let t = ticks.clone();
//! scheduler.add_scheduled_task(Box::new(move || {
//!     t.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! assert_eq!(scheduler.process_tasks().unwrap(), 1);
//! assert_eq!(ticks.load(Ordering::SeqCst), 1);
//! ```

use crate::error::SchedulerError;
use crossbeam::channel::{self, Receiver, Sender};
use event_bus::{ExecutionContext, Task};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread::{self, ThreadId};
use tracing::{debug, error, trace, warn};

enum Job {
    Run(Task),
    /// Unblocks a waiting loop without running anything
    Wake,
}

/// Single-owner task queue usable as an [`ExecutionContext`].
pub struct Scheduler {
    name: String,
    owner: OnceLock<ThreadId>,
    sender: Sender<Job>,
    receiver: Receiver<Job>,
    executed: AtomicU64,
    panicked: AtomicU64,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("owner", &self.owner.get())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Scheduler {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            name: name.into(),
            owner: OnceLock::new(),
            sender,
            receiver,
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes the calling thread the owner of this scheduler.
    ///
    /// Binding again from the owning thread is a no-op; binding from any
    /// other thread fails.
    pub fn bind_current_thread(&self) -> Result<(), SchedulerError> {
        self.bind(thread::current().id())
    }

    pub(crate) fn bind(&self, thread: ThreadId) -> Result<(), SchedulerError> {
        let owner = *self.owner.get_or_init(|| thread);
        if owner != thread {
            return Err(SchedulerError::AlreadyBound {
                name: self.name.clone(),
                owner,
            });
        }
        debug!("🧵 Scheduler {} bound to {:?}", self.name, owner);
        Ok(())
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.get().copied()
    }

    /// Whether the calling thread owns this scheduler.
    pub fn in_scheduler_thread(&self) -> bool {
        self.owner.get() == Some(&thread::current().id())
    }

    /// Enqueues `task`. It runs the next time the owner processes tasks.
    pub fn add_scheduled_task(&self, task: Task) {
        self.push(Job::Run(task));
    }

    pub(crate) fn wake(&self) {
        self.push(Job::Wake);
    }

    fn push(&self, job: Job) {
        // the scheduler holds its own receiver, so the channel never disconnects
        if self.sender.send(job).is_err() {
            warn!("⚠️ Scheduler {} dropped a task: queue closed", self.name);
        }
    }

    /// Runs every task queued at the time of the call, plus any those tasks
    /// enqueue themselves. Returns how many ran.
    pub fn process_tasks(&self) -> Result<usize, SchedulerError> {
        if !self.in_scheduler_thread() {
            return Err(SchedulerError::WrongThread {
                name: self.name.clone(),
            });
        }

        let mut count = 0;
        while let Ok(job) = self.receiver.try_recv() {
            if let Job::Run(task) = job {
                self.run_task(task);
                count += 1;
            }
        }
        if count > 0 {
            trace!("Scheduler {} processed {} task(s)", self.name, count);
        }
        Ok(count)
    }

    /// Blocks until a job arrives. Returns `None` for a wake-up.
    pub(crate) fn wait(&self) -> Option<Task> {
        match self.receiver.recv() {
            Ok(Job::Run(task)) => Some(task),
            Ok(Job::Wake) | Err(_) => None,
        }
    }

    /// Drops every queued task without running it. Returns how many were
    /// dropped.
    pub(crate) fn discard_pending(&self) -> usize {
        let mut dropped = 0;
        while let Ok(job) = self.receiver.try_recv() {
            if let Job::Run(_) = job {
                dropped += 1;
            }
        }
        dropped
    }

    /// Runs one task, containing any panic.
    pub(crate) fn run_task(&self, task: Task) {
        self.executed.fetch_add(1, Ordering::Relaxed);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            self.panicked.fetch_add(1, Ordering::Relaxed);
            error!(
                "💥 Task panicked on scheduler {}: {}",
                self.name,
                panic_message(payload.as_ref())
            );
        }
    }

    /// Tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Tasks run so far, including those that panicked.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

impl ExecutionContext for Scheduler {
    fn in_context(&self) -> bool {
        self.in_scheduler_thread()
    }

    fn execute(&self, task: Task) {
        self.add_scheduled_task(task);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn binding_is_exclusive() {
        let scheduler = Arc::new(Scheduler::new("bind"));
        assert!(scheduler.owner().is_none());
        assert!(!scheduler.in_scheduler_thread());

        scheduler.bind_current_thread().unwrap();
        scheduler.bind_current_thread().unwrap();
        assert!(scheduler.in_scheduler_thread());

        let other = Arc::clone(&scheduler);
        let result = thread::spawn(move || {
            (other.in_scheduler_thread(), other.bind_current_thread())
        })
        .join()
        .unwrap();
        assert!(!result.0);
        assert!(matches!(result.1, Err(SchedulerError::AlreadyBound { .. })));
    }

    #[test]
    fn process_tasks_requires_the_owner() {
        let scheduler = Scheduler::new("owner");
        let err = scheduler.process_tasks().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Scheduler 'owner' can only process tasks on its own thread"
        );
    }

    #[test]
    fn tasks_run_in_fifo_order() {
        let scheduler = Scheduler::new("fifo");
        scheduler.bind_current_thread().unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..4 {
            let order = Arc::clone(&order);
            scheduler.add_scheduled_task(Box::new(move || order.lock().unwrap().push(i)));
        }
        assert_eq!(scheduler.pending(), 4);
        assert_eq!(scheduler.process_tasks().unwrap(), 4);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(scheduler.process_tasks().unwrap(), 0);
    }

    #[test]
    fn panicking_tasks_do_not_stop_processing() {
        let scheduler = Scheduler::new("panic");
        scheduler.bind_current_thread().unwrap();
        let ran = Arc::new(AtomicU32::new(0));

        scheduler.add_scheduled_task(Box::new(|| panic!("task exploded")));
        let r = Arc::clone(&ran);
        scheduler.add_scheduled_task(Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(scheduler.process_tasks().unwrap(), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.executed(), 2);
        assert_eq!(scheduler.panicked(), 1);
    }

    #[test]
    fn discarded_tasks_never_run() {
        let scheduler = Scheduler::new("discard");
        let ran = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            scheduler.add_scheduled_task(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        scheduler.wake();

        assert_eq!(scheduler.discard_pending(), 3);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.executed(), 0);
    }

    #[test]
    fn wake_ups_are_not_counted() {
        let scheduler = Scheduler::new("wake");
        scheduler.bind_current_thread().unwrap();
        scheduler.wake();
        assert_eq!(scheduler.process_tasks().unwrap(), 0);
        assert_eq!(scheduler.executed(), 0);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
