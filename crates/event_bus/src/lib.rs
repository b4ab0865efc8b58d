//! # Event Bus
//!
//! An in-process publish/subscribe dispatcher. Components register handlers
//! for concrete event types; publishers hand an event to the bus, which
//! offers it to every interested handler in priority order and reports
//! whether the event ended up cancelled.
//!
//! ## Key Features
//!
//! - **Type-routed**: handlers are keyed by the exact concrete event type
//! - **Priority ordering**: higher priority first, ties in registration order
//! - **Cancellation**: events may opt in; later handlers are skipped unless
//!   they ask to see cancelled events
//! - **Execution-context handoff**: a handler may be bound to a context
//!   (scheduler thread, async runtime, ...) and is enqueued there when the
//!   publisher is elsewhere
//! - **Bulk unregistration**: by callback identity or by tag, across all
//!   event types
//! - **Subscribers**: objects that register a group of handlers at once and
//!   remove them with one call
//!
//! ## Quick Start
//!
//! ```rust
//! use event_bus::{cancellable_event, EventBus, EventPriority, HandlerOptions};
//!
//! #[derive(Debug, Clone, Default)]
//! struct ChatMessage {
//!     text: String,
//!     cancelled: bool,
//! }
//! cancellable_event!(ChatMessage, cancelled);
//!
//! let bus = EventBus::new();
//!
//! bus.register(
//!     HandlerOptions::default().priority(EventPriority::HIGH),
//!     |msg: &mut ChatMessage| {
//!         if msg.text.contains("spam") {
//!             msg.cancelled = true;
//!         }
//!         Ok(())
//!     },
//! );
//! bus.on(|msg: &mut ChatMessage| {
//!     println!("chat: {}", msg.text);
//!     Ok(())
//! });
//!
//! let mut msg = ChatMessage { text: "buy spam".into(), ..Default::default() };
//! assert!(bus.publish(&mut msg).unwrap());
//! ```

pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handler;
mod registry;
pub mod stats;
pub mod subscriber;

pub use bus::EventBus;
pub use config::BusConfig;
pub use context::{ExecutionContext, Task};
pub use error::EventError;
pub use events::{is_cancelled, AsAny, Cancellable, Event, EventPriority};
pub use handler::{EventFn, FunctionId, Handler, HandlerOptions, Tag, UnregisterKey};
pub use stats::BusStats;
pub use subscriber::{HandlerDescriptor, Subscriber, Subscriptions};

use std::sync::Arc;

/// Creates a shared bus with the default configuration.
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}

/// Creates a shared bus with `config`.
pub fn create_event_bus_with_config(config: BusConfig) -> Arc<EventBus> {
    Arc::new(EventBus::with_config(config))
}
