//! A [`Scheduler`] driven by its own named OS thread.

use crate::error::SchedulerError;
use crate::scheduler::Scheduler;
use event_bus::{ExecutionContext, Task};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Dedicated thread that runs scheduled tasks as soon as they arrive.
///
/// Dropping the handle shuts the thread down after the tasks already queued.
pub struct SchedulerThread {
    scheduler: Arc<Scheduler>,
    stopping: Arc<AtomicBool>,
    /// Set by the loop once it has run its last task
    finished: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerThread {
    /// Spawns the thread. `name` is used for both the thread and the
    /// scheduler.
    pub fn spawn(name: impl Into<String>) -> Result<Self, SchedulerError> {
        let name = name.into();
        let scheduler = Arc::new(Scheduler::new(name.clone()));
        let stopping = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            let stopping = Arc::clone(&stopping);
            let finished = Arc::clone(&finished);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_loop(&scheduler, &stopping, &finished))?
        };
        scheduler.bind(handle.thread().id())?;

        info!("🚀 Scheduler thread {} started", name);
        Ok(Self {
            scheduler,
            stopping,
            finished,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn is_running(&self) -> bool {
        !self.stopping.load(Ordering::Acquire)
    }

    /// Stops the loop once the queue is empty and joins the thread.
    ///
    /// Safe to call more than once. When called from a task running on the
    /// thread itself, the loop is told to stop but not joined.
    pub fn shutdown(&self) {
        let first = !self.stopping.swap(true, Ordering::AcqRel);
        if first {
            self.scheduler.wake();
        }

        if self.scheduler.in_scheduler_thread() {
            return;
        }

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("❌ Scheduler thread {} terminated abnormally", self.scheduler.name());
            } else {
                info!(
                    "🛑 Scheduler thread {} stopped after {} task(s)",
                    self.scheduler.name(),
                    self.scheduler.executed()
                );
            }
            self.discard_leftovers();
        }
    }

    /// Queues `task`. A task that lands after the loop has exited is
    /// dropped and logged instead of sitting in the queue forever.
    fn enqueue(&self, task: Task) {
        self.scheduler.add_scheduled_task(task);
        if self.finished.load(Ordering::SeqCst) {
            self.discard_leftovers();
        }
    }

    fn discard_leftovers(&self) {
        let dropped = self.scheduler.discard_pending();
        if dropped > 0 {
            warn!(
                "⚠️ Scheduler thread {} stopped before running {} task(s); dropping them",
                self.scheduler.name(),
                dropped
            );
        }
    }
}

fn run_loop(scheduler: &Scheduler, stopping: &AtomicBool, finished: &AtomicBool) {
    debug!("Scheduler loop {} running", scheduler.name());
    loop {
        if let Some(task) = scheduler.wait() {
            scheduler.run_task(task);
        }
        if stopping.load(Ordering::Acquire) && scheduler.pending() == 0 {
            break;
        }
    }
    finished.store(true, Ordering::SeqCst);
    debug!("Scheduler loop {} exiting", scheduler.name());
}

impl ExecutionContext for SchedulerThread {
    fn in_context(&self) -> bool {
        self.scheduler.in_scheduler_thread()
    }

    fn execute(&self, task: Task) {
        if !self.is_running() {
            warn!(
                "⚠️ Scheduler thread {} is shut down; dropping task",
                self.scheduler.name()
            );
            return;
        }
        self.enqueue(task);
    }

    fn name(&self) -> &str {
        self.scheduler.name()
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn tasks_run_on_the_named_thread() {
        let worker = SchedulerThread::spawn("io-worker").unwrap();
        assert!(!worker.in_context());

        let (tx, rx) = mpsc::channel();
        worker.execute(Box::new(move || {
            let current = thread::current();
            let _ = tx.send(current.name().map(str::to_owned));
        }));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("io-worker"));
    }

    #[test]
    fn shutdown_drains_queued_tasks() {
        let worker = SchedulerThread::spawn("drain").unwrap();
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..50 {
            let count = Arc::clone(&count);
            worker.execute(Box::new(move || {
                thread::sleep(Duration::from_micros(50));
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        worker.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 50);
        assert!(!worker.is_running());
        worker.shutdown();
    }

    #[test]
    fn tasks_after_shutdown_are_dropped() {
        let worker = SchedulerThread::spawn("closed").unwrap();
        worker.shutdown();

        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        worker.execute(Box::new(move || r.store(true, Ordering::SeqCst)));
        assert_eq!(worker.scheduler().pending(), 0);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn tasks_racing_shutdown_are_discarded() {
        let worker = SchedulerThread::spawn("racing").unwrap();
        worker.shutdown();
        assert!(worker.finished.load(Ordering::SeqCst));

        // a producer that saw the thread running just before shutdown
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        worker.enqueue(Box::new(move || r.store(true, Ordering::SeqCst)));

        assert_eq!(worker.scheduler().pending(), 0);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn in_context_is_true_inside_tasks() {
        let worker = Arc::new(SchedulerThread::spawn("self-check").unwrap());
        let (tx, rx) = mpsc::channel();

        let inner = Arc::clone(&worker);
        worker.execute(Box::new(move || {
            let _ = tx.send(inner.in_context());
        }));

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        worker.shutdown();
    }
}
