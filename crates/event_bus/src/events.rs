//! # Event Model
//!
//! Every value published on an [`EventBus`](crate::EventBus) implements [`Event`].
//! Routing uses the exact concrete type of the value: a handler registered for
//! `PlayerMoved` never sees a `PlayerTeleported`, whatever relationship the two
//! types have in user code.
//!
//! Cancellation is an opt-in capability. An event type becomes cancellable by
//! implementing [`Cancellable`] and exposing it through
//! [`Event::cancellable`] / [`Event::cancellable_mut`]; the
//! [`cancellable_event!`](crate::cancellable_event) macro does both for a
//! struct carrying a `bool` flag.
//!
//! ```rust
//! use event_bus::{cancellable_event, Cancellable, Event};
//!
//! #[derive(Debug, Clone)]
//! struct ChatMessage {
//!     text: String,
//!     cancelled: bool,
//! }
//! cancellable_event!(ChatMessage, cancelled);
//!
//! #[derive(Debug, Clone)]
//! struct ServerTick;
//! impl Event for ServerTick {}
//!
//! let mut msg = ChatMessage { text: "hi".into(), cancelled: false };
//! msg.set_cancelled(true);
//! assert!(event_bus::is_cancelled(&msg));
//! assert!(!event_bus::is_cancelled(&ServerTick));
//! ```

use std::any::{Any, TypeId};
use std::fmt::Debug;

/// Upcast helper giving every `'static` type an [`Any`] view.
///
/// Implemented for all sized `'static` types; it exists so that a
/// `&mut dyn Event` can be downcast back to its concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Trait implemented by all event types.
///
/// The default implementation is not cancellable. Override both
/// `cancellable` methods (or use [`cancellable_event!`](crate::cancellable_event))
/// to opt in.
pub trait Event: AsAny + Send + Sync + Debug + 'static {
    /// Human readable name of the concrete event type, used in logs and errors.
    fn event_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the cancellation capability, if this event type has one.
    fn cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }

    /// Mutable access to the cancellation capability.
    fn cancellable_mut(&mut self) -> Option<&mut dyn Cancellable> {
        None
    }
}

/// Cooperative cancellation flag carried by an event.
pub trait Cancellable {
    fn is_cancelled(&self) -> bool;
    fn set_cancelled(&mut self, cancelled: bool);
}

/// Standard priority levels. Larger values run earlier.
///
/// Any `i32` is a valid priority; these are only conventional anchors.
#[derive(Debug, Clone, Copy)]
pub struct EventPriority;

impl EventPriority {
    pub const HIGHEST: i32 = 200;
    pub const HIGH: i32 = 100;
    pub const NORMAL: i32 = 0;
    pub const LOW: i32 = -100;
    pub const LOWEST: i32 = -200;
}

/// Returns `true` when the event exposes the cancellation capability and is
/// currently marked cancelled. Events without the capability are never
/// cancelled.
pub fn is_cancelled(event: &dyn Event) -> bool {
    event.cancellable().map_or(false, |c| c.is_cancelled())
}

/// Routing key of an event: the `TypeId` of its concrete type.
pub(crate) fn type_of(event: &dyn Event) -> TypeId {
    Any::type_id(AsAny::as_any(event))
}

/// Implements [`Event`] and [`Cancellable`] for a struct whose cancellation
/// state lives in a `bool` field.
///
/// ```rust
/// use event_bus::cancellable_event;
///
/// #[derive(Debug, Clone, Default)]
/// struct BlockBreak {
///     x: i32,
///     cancelled: bool,
/// }
/// cancellable_event!(BlockBreak, cancelled);
/// ```
#[macro_export]
macro_rules! cancellable_event {
    ($event:ty, $field:ident) => {
        impl $crate::Cancellable for $event {
            fn is_cancelled(&self) -> bool {
                self.$field
            }

            fn set_cancelled(&mut self, cancelled: bool) {
                self.$field = cancelled;
            }
        }

        impl $crate::Event for $event {
            fn cancellable(&self) -> ::std::option::Option<&dyn $crate::Cancellable> {
                ::std::option::Option::Some(self)
            }

            fn cancellable_mut(
                &mut self,
            ) -> ::std::option::Option<&mut dyn $crate::Cancellable> {
                ::std::option::Option::Some(self)
            }
        }
    };
}
