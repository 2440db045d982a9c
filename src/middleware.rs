//! Middleware chain.
//!
//! # Data Flow
//! ```text
//! call(rpc, args, opts)
//!     → m1 (outermost, registered first)
//!     → m2 … mN
//!     → terminal dispatcher (server: handler invocation,
//!                            client: HTTP POST)
//!     ← Reply or error, unwinding back through mN … m1
//! ```
//!
//! Both the client and the server run the same chain shape around their
//! terminal dispatchers, so instrumentation written once works on either
//! side. A middleware may delegate to `next` (usually wrapping the call
//! with timing or recording) or short-circuit by returning or failing
//! directly. The options map flows through untouched for middleware
//! coordination; terminals ignore it.
//!
//! The stack is mutable only before its first dispatch. Pushing onto a
//! frozen stack is a programming error and panics: freezing ordering bugs
//! early beats permissive mutation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use crate::schema::{Reply, ThriftValue, ValidationError};

/// Type-keyed side channel shared by the middlewares of one call.
#[derive(Default)]
pub struct CallOptions {
    slots: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send + Sync>(&self, value: T) {
        self.slots
            .lock()
            .expect("call options mutex poisoned")
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Any + Clone + Send + Sync>(&self) -> Option<T> {
        self.slots
            .lock()
            .expect("call options mutex poisoned")
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }
}

/// One in-flight RPC as seen by the chain.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    /// The RPC name.
    pub rpc: &'a str,
    /// The args struct, type-erased; fields are the positional arguments
    /// in declared field-id order.
    pub args: &'a dyn ThriftValue,
    /// Free-form coordination channel.
    pub options: &'a CallOptions,
}

/// The innermost callable: performs the actual dispatch once the chain
/// has run.
pub type Terminal<'a, E> =
    Box<dyn FnOnce(Invocation<'a>) -> BoxFuture<'a, Result<Reply, E>> + Send + 'a>;

/// An "around" interceptor. `E` is the error channel of the side the
/// chain runs on (`ServerError` or `ClientError`).
pub trait Middleware<E>: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        invocation: Invocation<'a>,
        next: Next<'a, E>,
    ) -> BoxFuture<'a, Result<Reply, E>>;
}

/// Continuation handed to each middleware: the remaining layers plus the
/// terminal dispatcher.
pub struct Next<'a, E> {
    layers: &'a [Arc<dyn Middleware<E>>],
    terminal: Terminal<'a, E>,
}

impl<'a, E: 'a + 'static> Next<'a, E> {
    /// Runs the rest of the chain.
    pub fn run(self, invocation: Invocation<'a>) -> BoxFuture<'a, Result<Reply, E>> {
        match self.layers.split_first() {
            Some((head, rest)) => head.call(
                invocation,
                Next {
                    layers: rest,
                    terminal: self.terminal,
                },
            ),
            None => (self.terminal)(invocation),
        }
    }
}

/// Ordered middleware composition wrapping a terminal dispatcher. The
/// first pushed middleware is outermost: it sees requests first and
/// replies last.
pub struct MiddlewareStack<E> {
    layers: Vec<Arc<dyn Middleware<E>>>,
    frozen: AtomicBool,
}

impl<E> Default for MiddlewareStack<E> {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            frozen: AtomicBool::new(false),
        }
    }
}

impl<E: 'static> MiddlewareStack<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    ///
    /// # Panics
    /// Panics if the stack has already dispatched a call.
    pub fn push(&mut self, middleware: impl Middleware<E>) {
        if self.frozen.load(Ordering::Acquire) {
            panic!("middleware stack is frozen after first dispatch");
        }
        self.layers.push(Arc::new(middleware));
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs the chain around `terminal`, freezing the stack on first use.
    pub fn dispatch<'a>(
        &'a self,
        invocation: Invocation<'a>,
        terminal: Terminal<'a, E>,
    ) -> BoxFuture<'a, Result<Reply, E>> {
        self.frozen.store(true, Ordering::Release);
        Next {
            layers: &self.layers,
            terminal,
        }
        .run(invocation)
    }
}

/// Optional schema-validation middleware: runs the generated `validate()`
/// hook on inbound args and on the outbound reply value.
pub struct ValidationMiddleware;

impl<E> Middleware<E> for ValidationMiddleware
where
    E: From<ValidationError> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        invocation: Invocation<'a>,
        next: Next<'a, E>,
    ) -> BoxFuture<'a, Result<Reply, E>> {
        Box::pin(async move {
            invocation.args.validate_value()?;
            let reply = next.run(invocation).await?;
            match &reply {
                Reply::Value(v) => v.validate_value()?,
                Reply::Exception(e) => e.validate_value()?,
                Reply::Void => {}
            }
            Ok(reply)
        })
    }
}
