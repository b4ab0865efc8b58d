use crate::handler::UnregisterKey;

/// Errors surfaced by the event bus.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// `unregister` matched no handler in any bucket
    #[error("Failed to unregister: no event handler matches {key}")]
    NotRegistered { key: UnregisterKey },
    /// An inline handler returned an error; remaining handlers were not run
    #[error("An exception occurred during EventHandler execution (event: {event})")]
    HandlerFailed {
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },
    /// An inline handler panicked; remaining handlers were not run
    #[error("An exception occurred during EventHandler execution (event: {event}): handler panicked: {message}")]
    HandlerPanicked { event: &'static str, message: String },
    /// A handler was given an event of a type it was not registered for
    #[error("Handler for {expected} received an event of type {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// A subscriber referred to an execution context the bus does not know
    #[error("Unknown execution context: {0}")]
    UnknownContext(String),
    /// A subscriber violated the registration contract
    #[error("Invalid subscriber {subscriber}: {reason}")]
    InvalidSubscriber {
        subscriber: &'static str,
        reason: String,
    },
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EventError {
    /// Whether this error came from running a handler (as opposed to a
    /// registration or setup problem).
    pub fn is_handler_failure(&self) -> bool {
        matches!(
            self,
            EventError::HandlerFailed { .. } | EventError::HandlerPanicked { .. }
        )
    }
}
