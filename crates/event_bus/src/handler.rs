//! # Handlers
//!
//! A [`Handler`] is one subscription: a typed callback behind a type-erased
//! invoker, plus the metadata the dispatcher needs (priority,
//! cancellation visibility, optional execution context, unregister tag).
//!
//! Handlers are identified for removal either by the identity of their
//! callback ([`FunctionId`]) or by an opaque [`Tag`] shared by a group of
//! handlers, typically everything one subscriber object registered.

use crate::context::{ExecutionContext, Task};
use crate::error::EventError;
use crate::events::{self, AsAny, Event, EventPriority};
use std::any::{type_name, Any};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, trace};
use uuid::Uuid;

/// Shareable callback for events of type `E`.
///
/// Registering the same `EventFn` more than once creates independent
/// handlers that share one [`FunctionId`].
pub type EventFn<E> = Arc<dyn Fn(&mut E) -> anyhow::Result<()> + Send + Sync>;

/// Identity of a callback allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(usize);

impl FunctionId {
    /// Identity of `function`. Clones of the same `Arc` share it.
    pub fn of<E>(function: &EventFn<E>) -> Self {
        Self(Arc::as_ptr(function) as *const () as usize)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn@{:#x}", self.0)
    }
}

/// Opaque identity used only to unregister a group of handlers at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u128);

impl Tag {
    /// A fresh random tag.
    pub fn new() -> Self {
        Self(Uuid::new_v4().as_u128())
    }

    /// The tag of an owner object, derived from its allocation.
    ///
    /// Stable for as long as the `Arc` is alive. Handlers registered through
    /// [`EventBus::register_subscriber`](crate::EventBus::register_subscriber)
    /// hold a clone of the owner, so the address cannot be handed to another
    /// allocation while any of them is still registered. Tagging handlers
    /// manually with `Tag::of` gives no such guarantee once the owner drops.
    pub fn of<T: ?Sized>(owner: &Arc<T>) -> Self {
        Self(Arc::as_ptr(owner) as *const () as usize as u128)
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag:{:032x}", self.0)
    }
}

/// What `unregister` matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnregisterKey {
    Function(FunctionId),
    Tag(Tag),
}

impl fmt::Display for UnregisterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnregisterKey::Function(id) => write!(f, "function {id}"),
            UnregisterKey::Tag(tag) => write!(f, "{tag}"),
        }
    }
}

impl From<FunctionId> for UnregisterKey {
    fn from(id: FunctionId) -> Self {
        UnregisterKey::Function(id)
    }
}

impl From<Tag> for UnregisterKey {
    fn from(tag: Tag) -> Self {
        UnregisterKey::Tag(tag)
    }
}

impl<E> From<&EventFn<E>> for UnregisterKey {
    fn from(function: &EventFn<E>) -> Self {
        UnregisterKey::Function(FunctionId::of(function))
    }
}

impl From<&Arc<Handler>> for UnregisterKey {
    fn from(handler: &Arc<Handler>) -> Self {
        UnregisterKey::Function(handler.function_id())
    }
}

/// Dispatch metadata supplied at registration.
///
/// ```rust
/// use event_bus::{EventPriority, HandlerOptions, Tag};
///
/// let options = HandlerOptions::default()
///     .priority(EventPriority::HIGH)
///     .ignore_cancelled(true)
///     .unregister_tag(Tag::new());
/// assert_eq!(options.get_priority(), EventPriority::HIGH);
/// ```
#[derive(Clone)]
pub struct HandlerOptions {
    pub(crate) priority: i32,
    pub(crate) ignore_cancelled: bool,
    pub(crate) context: Option<Arc<dyn ExecutionContext>>,
    pub(crate) tag: Option<Tag>,
    pub(crate) owner: Option<Arc<dyn Any + Send + Sync>>,
}

impl HandlerOptions {
    /// Larger runs earlier. Defaults to [`EventPriority::NORMAL`].
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// If true the handler still runs once the event has been cancelled.
    pub fn ignore_cancelled(mut self, ignore_cancelled: bool) -> Self {
        self.ignore_cancelled = ignore_cancelled;
        self
    }

    /// Run the handler on `context` instead of inline.
    pub fn execution_context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn unregister_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    /// Keeps `owner` alive for as long as the handler is registered.
    pub(crate) fn keep_alive(mut self, owner: Arc<dyn Any + Send + Sync>) -> Self {
        self.owner = Some(owner);
        self
    }
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            priority: EventPriority::NORMAL,
            ignore_cancelled: false,
            context: None,
            tag: None,
            owner: None,
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .field("context", &self.context.as_ref().map(|c| c.name().to_owned()))
            .field("tag", &self.tag)
            .finish()
    }
}

/// Type-erased callback.
trait Invoker: Send + Sync {
    fn call(&self, event: &mut dyn Any) -> Result<(), EventError>;

    /// Clones the event and packages the callback as a deferred task.
    fn defer(&self, event: &dyn Any) -> Result<Task, EventError>;
}

struct TypedInvoker<E> {
    function: EventFn<E>,
}

impl<E: Event + Clone> TypedInvoker<E> {
    fn mismatch() -> EventError {
        EventError::TypeMismatch {
            expected: type_name::<E>(),
            found: "<unknown>",
        }
    }
}

impl<E: Event + Clone> Invoker for TypedInvoker<E> {
    fn call(&self, event: &mut dyn Any) -> Result<(), EventError> {
        let event = event.downcast_mut::<E>().ok_or_else(Self::mismatch)?;
        (self.function)(event).map_err(|source| EventError::HandlerFailed {
            event: type_name::<E>(),
            source,
        })
    }

    fn defer(&self, event: &dyn Any) -> Result<Task, EventError> {
        let mut event = event.downcast_ref::<E>().ok_or_else(Self::mismatch)?.clone();
        let function = Arc::clone(&self.function);
        Ok(Box::new(move || {
            if let Err(e) = function(&mut event) {
                error!(
                    "❌ Deferred handler for {} failed: {:#}",
                    type_name::<E>(),
                    e
                );
            }
        }))
    }
}

/// How the dispatcher dealt with one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invocation {
    Inline,
    Deferred,
    Skipped,
}

/// One registered subscription.
pub struct Handler {
    function: FunctionId,
    event_name: &'static str,
    priority: i32,
    ignore_cancelled: bool,
    context: Option<Arc<dyn ExecutionContext>>,
    tag: Option<Tag>,
    invoker: Box<dyn Invoker>,
    // pins the subscriber allocation so its tag stays unique
    _owner: Option<Arc<dyn Any + Send + Sync>>,
}

impl Handler {
    pub(crate) fn new<E: Event + Clone>(function: EventFn<E>, options: HandlerOptions) -> Self {
        Self {
            function: FunctionId::of(&function),
            event_name: type_name::<E>(),
            priority: options.priority,
            ignore_cancelled: options.ignore_cancelled,
            context: options.context,
            tag: options.tag,
            invoker: Box::new(TypedInvoker { function }),
            _owner: options.owner,
        }
    }

    pub fn function_id(&self) -> FunctionId {
        self.function
    }

    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn ignores_cancelled(&self) -> bool {
        self.ignore_cancelled
    }

    pub fn unregister_tag(&self) -> Option<Tag> {
        self.tag
    }

    pub fn execution_context(&self) -> Option<&Arc<dyn ExecutionContext>> {
        self.context.as_ref()
    }

    /// Whether `key` names this handler's callback or tag.
    pub fn matches(&self, key: &UnregisterKey) -> bool {
        match key {
            UnregisterKey::Function(id) => self.function == *id,
            UnregisterKey::Tag(tag) => self.tag == Some(*tag),
        }
    }

    /// Offers `event` to this handler.
    ///
    /// The cancelled state is read here, immediately before running, so a
    /// cancellation by the previous handler in the same publish is honoured.
    pub(crate) fn invoke(
        &self,
        event: &mut dyn Event,
        catch_panics: bool,
    ) -> Result<Invocation, EventError> {
        if !self.ignore_cancelled && events::is_cancelled(event) {
            trace!("Skipping cancelled {} for handler {}", self.event_name, self.function);
            return Ok(Invocation::Skipped);
        }

        match &self.context {
            Some(context) if !context.in_context() => {
                let task = self.invoker.defer(AsAny::as_any(&*event))?;
                trace!("Deferring {} handler to {}", self.event_name, context.name());
                context.execute(task);
                Ok(Invocation::Deferred)
            }
            _ => {
                self.invoke_inline(event, catch_panics)?;
                Ok(Invocation::Inline)
            }
        }
    }

    fn invoke_inline(&self, event: &mut dyn Event, catch_panics: bool) -> Result<(), EventError> {
        let any = AsAny::as_any_mut(event);
        if !catch_panics {
            return self.invoker.call(any);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.invoker.call(any))) {
            Ok(result) => result,
            Err(payload) => Err(EventError::HandlerPanicked {
                event: self.event_name,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("function", &self.function)
            .field("event", &self.event_name)
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .field("context", &self.context.as_ref().map(|c| c.name().to_owned()))
            .field("tag", &self.tag)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default)]
    struct Counter {
        hits: usize,
        cancelled: bool,
    }
    crate::cancellable_event!(Counter, cancelled);

    fn counting_fn() -> EventFn<Counter> {
        Arc::new(|event: &mut Counter| -> anyhow::Result<()> {
            event.hits += 1;
            Ok(())
        })
    }

    #[test]
    fn function_identity_follows_the_allocation() {
        let f = counting_fn();
        let g = counting_fn();
        assert_eq!(FunctionId::of(&f), FunctionId::of(&Arc::clone(&f)));
        assert_ne!(FunctionId::of(&f), FunctionId::of(&g));
    }

    #[test]
    fn owner_tags_are_stable_and_distinct() {
        let a = Arc::new(1u8);
        let b = Arc::new(1u8);
        assert_eq!(Tag::of(&a), Tag::of(&Arc::clone(&a)));
        assert_ne!(Tag::of(&a), Tag::of(&b));
        assert_ne!(Tag::new(), Tag::new());
    }

    #[test]
    fn matches_by_function_or_tag() {
        let tag = Tag::new();
        let f = counting_fn();
        let handler = Handler::new(Arc::clone(&f), HandlerOptions::default().unregister_tag(tag));

        assert!(handler.matches(&UnregisterKey::from(&f)));
        assert!(handler.matches(&tag.into()));
        assert!(!handler.matches(&Tag::new().into()));
        assert!(!handler.matches(&UnregisterKey::from(&counting_fn())));
    }

    #[test]
    fn inline_invocation_mutates_the_event() {
        let handler = Handler::new(counting_fn(), HandlerOptions::default());
        let mut event = Counter::default();
        let outcome = handler.invoke(&mut event, true).unwrap();
        assert_eq!(outcome, Invocation::Inline);
        assert_eq!(event.hits, 1);
    }

    #[test]
    fn cancelled_events_are_skipped_unless_ignored() {
        let skipping = Handler::new(counting_fn(), HandlerOptions::default());
        let ignoring = Handler::new(counting_fn(), HandlerOptions::default().ignore_cancelled(true));
        let mut event = Counter {
            cancelled: true,
            ..Counter::default()
        };

        assert_eq!(skipping.invoke(&mut event, true).unwrap(), Invocation::Skipped);
        assert_eq!(ignoring.invoke(&mut event, true).unwrap(), Invocation::Inline);
        assert_eq!(event.hits, 1);
    }

    #[test]
    fn errors_are_wrapped_with_handler_context() {
        let failing: EventFn<Counter> = Arc::new(|_: &mut Counter| -> anyhow::Result<()> {
            anyhow::bail!("boom")
        });
        let handler = Handler::new(failing, HandlerOptions::default());
        let err = handler.invoke(&mut Counter::default(), true).unwrap_err();

        assert!(err.is_handler_failure());
        assert!(err
            .to_string()
            .starts_with("An exception occurred during EventHandler execution"));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "boom");
    }

    #[test]
    fn panics_become_errors() {
        let panicking: EventFn<Counter> = Arc::new(|_: &mut Counter| -> anyhow::Result<()> {
            panic!("handler exploded")
        });
        let handler = Handler::new(panicking, HandlerOptions::default());
        match handler.invoke(&mut Counter::default(), true) {
            Err(EventError::HandlerPanicked { message, .. }) => {
                assert_eq!(message, "handler exploded")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    struct QueueContext {
        queued: std::sync::Mutex<Vec<Task>>,
        inside: bool,
    }

    impl ExecutionContext for QueueContext {
        fn in_context(&self) -> bool {
            self.inside
        }

        fn execute(&self, task: Task) {
            self.queued.lock().unwrap().push(task);
        }
    }

    #[test]
    fn deferred_invocation_works_on_a_snapshot() {
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);
        let function: EventFn<Counter> = Arc::new(move |event: &mut Counter| -> anyhow::Result<()> {
            event.hits += 1;
            event.cancelled = true;
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let context = Arc::new(QueueContext {
            queued: std::sync::Mutex::new(Vec::new()),
            inside: false,
        });
        let handler = Handler::new(
            function,
            HandlerOptions::default().execution_context(context.clone()),
        );

        let mut event = Counter::default();
        assert_eq!(handler.invoke(&mut event, true).unwrap(), Invocation::Deferred);
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let tasks: Vec<Task> = context.queued.lock().unwrap().drain(..).collect();
        assert_eq!(tasks.len(), 1);
        for task in tasks {
            task();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        // the publisher's copy is untouched by the deferred run
        assert_eq!(event.hits, 0);
        assert!(!event.cancelled);
    }

    #[test]
    fn runs_inline_when_already_on_the_context() {
        let context = Arc::new(QueueContext {
            queued: std::sync::Mutex::new(Vec::new()),
            inside: true,
        });
        let handler = Handler::new(
            counting_fn(),
            HandlerOptions::default().execution_context(context.clone()),
        );
        let mut event = Counter::default();
        assert_eq!(handler.invoke(&mut event, true).unwrap(), Invocation::Inline);
        assert_eq!(event.hits, 1);
        assert!(context.queued.lock().unwrap().is_empty());
    }
}
