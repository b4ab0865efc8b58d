//! # Event Scheduler
//!
//! Concrete [`ExecutionContext`](event_bus::ExecutionContext)s for
//! [`event_bus`] handlers.
//!
//! - [`Scheduler`]: a queue drained by one owning thread, e.g. a game or UI
//!   main loop calling [`Scheduler::process_tasks`] once per tick
//! - [`SchedulerThread`]: a scheduler with its own thread that runs tasks as
//!   they arrive
//! - [`TokioContext`]: spawns deferred handlers onto a tokio runtime
//!
//! ```rust
//! use event_bus::{Event, EventBus, HandlerOptions};
//! use event_scheduler::SchedulerThread;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone)]
//! struct WorldSaved;
//! impl Event for WorldSaved {}
//!
//! let io = Arc::new(SchedulerThread::spawn("io").unwrap());
//! let bus = EventBus::new();
//! bus.register(
//!     HandlerOptions::default().execution_context(io.clone()),
//!     |_: &mut WorldSaved| Ok(()),
//! );
//!
//! bus.publish(&mut WorldSaved).unwrap();
//! io.shutdown();
//! assert_eq!(io.scheduler().executed(), 1);
//! ```

pub mod error;
pub mod scheduler;
pub mod thread;
pub mod tokio_context;

pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use thread::SchedulerThread;
pub use tokio_context::TokioContext;
