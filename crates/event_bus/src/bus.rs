//! # Event Bus
//!
//! [`EventBus`] routes a published event to the bucket registered for its
//! exact concrete type and offers it to every handler in priority order.
//!
//! ## Dispatch rules
//! - **Quick exit**: a type with no handlers returns `false` without
//!   allocating.
//! - **Ordering**: descending priority, ties in registration order.
//! - **Cancellation**: checked per handler, immediately before it runs.
//! - **Fail fast**: the first inline handler error aborts the publish and is
//!   returned to the publisher.
//! - **Handoff**: a handler bound to an execution context the publisher is
//!   not on is enqueued there and not waited for.
//! - **Re-entrancy**: handlers may publish, register or unregister; the
//!   running traversal keeps the snapshot it started with.

use crate::config::BusConfig;
use crate::context::ExecutionContext;
use crate::error::EventError;
use crate::events::{self, Event};
use crate::handler::{EventFn, Handler, HandlerOptions, Invocation, Tag, UnregisterKey};
use crate::registry::HandlerRegistry;
use crate::stats::{BusStats, StatsCounters};
use crate::subscriber::{Subscriber, Subscriptions};
use dashmap::DashMap;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// In-process publish/subscribe dispatcher.
///
/// The bus is `Send + Sync`; share it behind an `Arc` to publish from
/// several threads.
pub struct EventBus {
    registry: HandlerRegistry,
    contexts: DashMap<String, Arc<dyn ExecutionContext>>,
    config: BusConfig,
    stats: StatsCounters,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.registry.len())
            .field("contexts", &self.contexts.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with the default configuration and no handlers.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            contexts: DashMap::new(),
            config,
            stats: StatsCounters::default(),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Handler options pre-filled with the configured default priority.
    pub fn options(&self) -> HandlerOptions {
        HandlerOptions::default().priority(self.config.default_priority)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers `function` for events of type `E` with default options.
    ///
    /// ```rust
    /// use event_bus::{Event, EventBus};
    ///
    /// #[derive(Debug, Clone)]
    /// struct Tick(u64);
    /// impl Event for Tick {}
    ///
    /// let bus = EventBus::new();
    /// bus.on(|tick: &mut Tick| {
    ///     tick.0 += 1;
    ///     Ok(())
    /// });
    ///
    /// let mut tick = Tick(0);
    /// assert!(!bus.publish(&mut tick).unwrap());
    /// assert_eq!(tick.0, 1);
    /// ```
    pub fn on<E, F>(&self, function: F) -> Arc<Handler>
    where
        E: Event + Clone,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(self.options(), function)
    }

    /// Registers `function` for events of type `E`.
    pub fn register<E, F>(&self, options: HandlerOptions, function: F) -> Arc<Handler>
    where
        E: Event + Clone,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let function: EventFn<E> = Arc::new(function);
        self.register_fn(options, function)
    }

    /// Registers a shareable callback. The same `EventFn` may be registered
    /// any number of times; each call creates an independent handler.
    pub fn register_fn<E>(&self, options: HandlerOptions, function: EventFn<E>) -> Arc<Handler>
    where
        E: Event + Clone,
    {
        let handler = Arc::new(Handler::new(function, options));
        let bucket_len =
            self.registry
                .insert(TypeId::of::<E>(), type_name::<E>(), Arc::clone(&handler));
        StatsCounters::bump(&self.stats.registered);

        debug!(
            "📝 Registered handler for {} (priority {}, {} in bucket)",
            handler.event_name(),
            handler.priority(),
            bucket_len
        );
        handler
    }

    /// Removes every handler whose callback or unregister tag matches `key`,
    /// across all event types. Returns how many were removed.
    ///
    /// Fails with [`EventError::NotRegistered`] when nothing matched.
    pub fn unregister(&self, key: impl Into<UnregisterKey>) -> Result<usize, EventError> {
        let key = key.into();
        let removed = self.registry.remove(&key);
        if removed == 0 {
            return Err(EventError::NotRegistered { key });
        }

        StatsCounters::add(&self.stats.unregistered, removed as u64);
        debug!("🗑️ Unregistered {} handler(s) matching {}", removed, key);
        Ok(removed)
    }

    /// Removes all handlers.
    pub fn clear(&self) {
        let removed = self.registry.clear();
        StatsCounters::add(&self.stats.unregistered, removed as u64);
        debug!("🧹 Cleared {} handler(s)", removed);
    }

    // ------------------------------------------------------------------
    // Subscribers and execution contexts
    // ------------------------------------------------------------------

    /// Makes `context` available to subscribers under `name`, replacing any
    /// previous context with that name.
    pub fn add_context(&self, name: impl Into<String>, context: Arc<dyn ExecutionContext>) {
        let name = name.into();
        debug!("Registered execution context {} ({})", name, context.name());
        self.contexts.insert(name, context);
    }

    pub fn context(&self, name: &str) -> Option<Arc<dyn ExecutionContext>> {
        self.contexts.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Registers every handler `owner` describes, tagged with
    /// [`Tag::of(&owner)`](Tag::of).
    ///
    /// The descriptors are validated first: if the subscriber fails, names
    /// an unknown context or declares no handlers, nothing is registered.
    ///
    /// Each handler holds a clone of `owner`, so the owner outlives its
    /// registrations and its tag cannot collide with a later subscriber.
    pub fn register_subscriber<S: Subscriber>(&self, owner: Arc<S>) -> Result<Tag, EventError> {
        let tag = Tag::of(&owner);
        let name = type_name::<S>();

        let mut subs = Subscriptions::new(name, self.config.default_priority);
        Arc::clone(&owner).subscribe(&mut subs)?;
        if subs.is_empty() {
            return Err(subs.reject("declares no event handlers"));
        }

        let mut resolved = Vec::with_capacity(subs.len());
        for descriptor in subs.into_descriptors() {
            let (context_name, options, install) = descriptor.into_parts();
            let options = match context_name {
                Some(context_name) => {
                    let context = self
                        .context(&context_name)
                        .ok_or(EventError::UnknownContext(context_name))?;
                    options.execution_context(context)
                }
                None => options,
            };
            let keep_alive: Arc<dyn Any + Send + Sync> = owner.clone();
            resolved.push((options.unregister_tag(tag).keep_alive(keep_alive), install));
        }

        let count = resolved.len();
        for (options, install) in resolved {
            install(self, options);
        }

        debug!("📦 Registered subscriber {} with {} handler(s) as {}", name, count, tag);
        Ok(tag)
    }

    /// Removes everything `owner` registered through
    /// [`register_subscriber`](Self::register_subscriber).
    pub fn unregister_subscriber<S: ?Sized>(&self, owner: &Arc<S>) -> Result<usize, EventError> {
        self.unregister(Tag::of(owner))
    }

    // ------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------

    /// Publishes `event` to the handlers registered for `E`.
    ///
    /// Returns whether the event ended up cancelled. Events without the
    /// cancellation capability always report `false`.
    pub fn publish<E: Event>(&self, event: &mut E) -> Result<bool, EventError> {
        self.publish_dyn(event)
    }

    /// Publishes an event whose concrete type is only known at runtime.
    /// Routing uses that runtime type.
    pub fn publish_dyn(&self, event: &mut dyn Event) -> Result<bool, EventError> {
        StatsCounters::bump(&self.stats.published);

        let handlers = self
            .registry
            .snapshot(&events::type_of(event))
            .filter(|handlers| !handlers.is_empty());
        let Some(handlers) = handlers else {
            StatsCounters::bump(&self.stats.unhandled);
            if self.config.warn_on_unhandled {
                warn!("⚠️ No handlers for event: {}", event.event_name());
            } else {
                trace!("No handlers for event: {}", event.event_name());
            }
            return Ok(false);
        };

        trace!(
            "📤 Publishing {} to {} handler(s)",
            event.event_name(),
            handlers.len()
        );

        for handler in handlers.iter() {
            match handler.invoke(&mut *event, self.config.catch_panics) {
                Ok(Invocation::Inline) => StatsCounters::bump(&self.stats.invoked),
                Ok(Invocation::Deferred) => StatsCounters::bump(&self.stats.deferred),
                Ok(Invocation::Skipped) => StatsCounters::bump(&self.stats.skipped),
                Err(e) => {
                    StatsCounters::bump(&self.stats.failures);
                    return Err(e);
                }
            }
        }

        Ok(events::is_cancelled(event))
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    pub fn handler_count_for<E: Event>(&self) -> usize {
        self.registry.len_for(&TypeId::of::<E>())
    }

    pub fn has_handlers<E: Event>(&self) -> bool {
        self.handler_count_for::<E>() > 0
    }

    /// Type names of events that currently have handlers, sorted.
    pub fn registered_event_types(&self) -> Vec<&'static str> {
        self.registry.event_names()
    }

    pub fn stats(&self) -> BusStats {
        self.stats.snapshot(self.registry.len())
    }
}
