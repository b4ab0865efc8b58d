//! # Subscribers
//!
//! Bulk registration for objects that own several handlers. A [`Subscriber`]
//! describes its handlers into a [`Subscriptions`] set; the bus validates the
//! whole set and only then registers every handler, tagged with the owner's
//! identity so that one `unregister_subscriber` call removes them all.
//!
//! ```rust
//! use event_bus::{subscribe, EventBus, EventError, Event, Subscriber, Subscriptions};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! #[derive(Debug, Clone)]
//! struct PlayerJoined { name: String }
//! impl Event for PlayerJoined {}
//!
//! #[derive(Default)]
//! struct Greeter { greeted: AtomicU32 }
//!
//! impl Greeter {
//!     fn greet(&self, event: &mut PlayerJoined) -> anyhow::Result<()> {
//!         assert!(!event.name.is_empty());
//!         self.greeted.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! impl Subscriber for Greeter {
//!     fn subscribe(self: Arc<Self>, subs: &mut Subscriptions) -> Result<(), EventError> {
//!         subscribe!(subs, self;
//!             PlayerJoined => greet { priority: 10 },
//!         );
//!         Ok(())
//!     }
//! }
//!
//! let bus = EventBus::new();
//! let greeter = Arc::new(Greeter::default());
//! bus.register_subscriber(greeter.clone()).unwrap();
//! bus.publish(&mut PlayerJoined { name: "ada".into() }).unwrap();
//! assert_eq!(greeter.greeted.load(Ordering::SeqCst), 1);
//! bus.unregister_subscriber(&greeter).unwrap();
//! ```

use crate::bus::EventBus;
use crate::error::EventError;
use crate::events::Event;
use crate::handler::{EventFn, Handler, HandlerOptions};
use std::any::type_name;
use std::fmt;
use std::sync::Arc;

/// An object that registers a group of handlers in one go.
pub trait Subscriber: Send + Sync + 'static {
    /// Describes this subscriber's handlers.
    ///
    /// Returning an error aborts the registration before any handler is
    /// installed.
    fn subscribe(self: Arc<Self>, subs: &mut Subscriptions) -> Result<(), EventError>;
}

type Install = Box<dyn FnOnce(&EventBus, HandlerOptions) -> Arc<Handler>>;

/// One handler a subscriber intends to register.
pub struct HandlerDescriptor {
    event_name: &'static str,
    context: Option<String>,
    options: HandlerOptions,
    install: Install,
}

impl HandlerDescriptor {
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    /// Name of the execution context this handler asked for, if any.
    pub fn context_name(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.options
    }

    pub(crate) fn into_parts(self) -> (Option<String>, HandlerOptions, Install) {
        (self.context, self.options, self.install)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("event", &self.event_name)
            .field("context", &self.context)
            .field("options", &self.options)
            .finish()
    }
}

/// Collects the handler descriptors of one subscriber.
pub struct Subscriptions {
    subscriber: &'static str,
    default_priority: i32,
    descriptors: Vec<HandlerDescriptor>,
}

impl Subscriptions {
    pub(crate) fn new(subscriber: &'static str, default_priority: i32) -> Self {
        Self {
            subscriber,
            default_priority,
            descriptors: Vec::new(),
        }
    }

    /// Options pre-filled with the bus default priority.
    pub fn options(&self) -> HandlerOptions {
        HandlerOptions::default().priority(self.default_priority)
    }

    /// Describes an inline (or directly bound) handler.
    pub fn on<E, F>(&mut self, options: HandlerOptions, function: F) -> &mut Self
    where
        E: Event + Clone,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.describe::<E, F>(None, options, function)
    }

    /// Describes a handler that runs on the execution context registered on
    /// the bus under `context`.
    pub fn on_context<E, F>(&mut self, context: &str, options: HandlerOptions, function: F) -> &mut Self
    where
        E: Event + Clone,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.describe::<E, F>(Some(context), options, function)
    }

    #[doc(hidden)]
    pub fn describe<E, F>(
        &mut self,
        context: Option<&str>,
        options: HandlerOptions,
        function: F,
    ) -> &mut Self
    where
        E: Event + Clone,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let function: EventFn<E> = Arc::new(function);
        self.descriptors.push(HandlerDescriptor {
            event_name: type_name::<E>(),
            context: context.map(str::to_owned),
            options,
            install: Box::new(move |bus: &EventBus, options: HandlerOptions| {
                bus.register_fn(options, function)
            }),
        });
        self
    }

    /// Builds the error a subscriber returns to reject its own registration.
    pub fn reject(&self, reason: impl Into<String>) -> EventError {
        EventError::InvalidSubscriber {
            subscriber: self.subscriber,
            reason: reason.into(),
        }
    }

    pub fn subscriber_name(&self) -> &'static str {
        self.subscriber
    }

    pub fn descriptors(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn into_descriptors(self) -> Vec<HandlerDescriptor> {
        self.descriptors
    }
}

/// Describes handlers that forward to methods of an owner object.
///
/// Each entry reads `Event => method`, optionally followed by a block of
/// [`HandlerOptions`] setters and `@ "context"` to run on a named execution
/// context:
///
/// ```rust,ignore
/// subscribe!(subs, self;
///     PlayerJoined => greet,
///     ChatMessage => filter { priority: EventPriority::HIGH, ignore_cancelled: false },
///     ChatMessage => persist @ "io",
/// );
/// ```
///
/// Methods take `&self` and `&mut Event` and return `anyhow::Result<()>`.
#[macro_export]
macro_rules! subscribe {
    ($subs:expr, $owner:expr;
     $( $event:ty => $method:ident
        $( { $( $option:ident : $value:expr ),* $(,)? } )?
        $( @ $context:literal )?
     ),* $(,)?
    ) => {{
        $(
            let owner = ::std::sync::Arc::clone(&$owner);
            let options = $subs.options() $( $( .$option($value) )* )?;
            let context: ::std::option::Option<&str> =
                ::std::option::Option::None $( .or(::std::option::Option::Some($context)) )?;
            $subs.describe::<$event, _>(context, options, move |event: &mut $event| {
                owner.$method(event)
            });
        )*
    }};
}
