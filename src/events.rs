//! Lifecycle event bus.
//!
//! The server publishes exactly one event per handled request:
//! `rpc_success`, `rpc_exception`, `rpc_error` or `internal_error`.
//! Delivery is synchronous, in subscription order, and best-effort: a
//! subscriber that panics is caught and logged, and delivery of that
//! event stops at the failing subscriber. That cut-off is the documented
//! contract, not a bug — do not promote it to best-effort-all.
//!
//! The subscriber list is sealed at the first publish; late subscription
//! is a programming error and panics.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, Uri};

use crate::errors::ServerError;
use crate::schema::{Reply, ThriftValue};

/// The request being described, captured before the body was consumed.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// Handler returned a value (or void); a REPLY went out.
pub struct RpcSuccess {
    pub request: RequestInfo,
    pub rpc: String,
    pub args: Arc<dyn ThriftValue>,
    pub reply: Reply,
    pub elapsed: Duration,
}

/// Handler raised a schema-declared exception; still a REPLY.
pub struct RpcException {
    pub request: RequestInfo,
    pub rpc: String,
    pub args: Arc<dyn ThriftValue>,
    pub exception: Arc<dyn ThriftValue>,
    pub elapsed: Duration,
}

/// A taxonomy error other than `Internal`; an EXCEPTION response went out.
pub struct RpcError {
    pub request: RequestInfo,
    /// Known unless the failure predates route matching.
    pub rpc: Option<String>,
    /// Present when args decoding was reached and succeeded.
    pub args: Option<Arc<dyn ThriftValue>>,
    pub error: ServerError,
    pub elapsed: Duration,
}

/// An unhandled handler failure; an EXCEPTION response went out.
pub struct InternalError {
    pub request: RequestInfo,
    pub rpc: Option<String>,
    pub args: Option<Arc<dyn ThriftValue>>,
    pub error: ServerError,
    pub elapsed: Duration,
}

/// One lifecycle event, published after the response is fully constructed.
pub enum Event {
    Success(RpcSuccess),
    Exception(RpcException),
    Error(RpcError),
    Internal(InternalError),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Success(_) => "rpc_success",
            Event::Exception(_) => "rpc_exception",
            Event::Error(_) => "rpc_error",
            Event::Internal(_) => "internal_error",
        }
    }

    /// The RPC name, when it was resolved before the outcome.
    pub fn rpc(&self) -> Option<&str> {
        match self {
            Event::Success(e) => Some(&e.rpc),
            Event::Exception(e) => Some(&e.rpc),
            Event::Error(e) => e.rpc.as_deref(),
            Event::Internal(e) => e.rpc.as_deref(),
        }
    }

    /// Wall-clock time from request receipt to response construction,
    /// measured on a monotonic clock.
    pub fn elapsed_ms(&self) -> u128 {
        let elapsed = match self {
            Event::Success(e) => e.elapsed,
            Event::Exception(e) => e.elapsed,
            Event::Error(e) => e.elapsed,
            Event::Internal(e) => e.elapsed,
        };
        elapsed.as_millis()
    }
}

/// Receives lifecycle callbacks. Default implementations ignore the
/// event, so a subscriber declares interest by overriding.
pub trait Subscriber: Send + Sync + 'static {
    fn rpc_success(&self, _event: &RpcSuccess) {}
    fn rpc_exception(&self, _event: &RpcException) {}
    fn rpc_error(&self, _event: &RpcError) {}
    fn internal_error(&self, _event: &InternalError) {}
}

/// Ordered, synchronous fan-out to subscribers.
pub struct EventBus {
    subscribers: Vec<Arc<dyn Subscriber>>,
    sealed: AtomicBool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
            sealed: AtomicBool::new(false),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber.
    ///
    /// # Panics
    /// Panics if the bus has already published an event.
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        if self.sealed.load(Ordering::Acquire) {
            panic!("subscriber list is sealed after first publish");
        }
        self.subscribers.push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Delivers an event to subscribers in subscription order, sealing
    /// the list. A panicking subscriber stops delivery of this event.
    pub fn publish(&self, event: &Event) {
        self.sealed.store(true, Ordering::Release);
        for subscriber in &self.subscribers {
            let delivery = catch_unwind(AssertUnwindSafe(|| match event {
                Event::Success(e) => subscriber.rpc_success(e),
                Event::Exception(e) => subscriber.rpc_exception(e),
                Event::Error(e) => subscriber.rpc_error(e),
                Event::Internal(e) => subscriber.internal_error(e),
            }));
            if delivery.is_err() {
                tracing::warn!(
                    event = event.name(),
                    rpc = event.rpc().unwrap_or("-"),
                    "subscriber panicked; delivery of this event stops here"
                );
                break;
            }
        }
    }
}
