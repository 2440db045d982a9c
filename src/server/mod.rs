//! Server half of the gateway.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → handler.rs (protocol selection, route parse)
//!     → per-RPC entry (args decode → middleware chain → handler
//!       → result envelope)
//!     → handler.rs (status 200/500, exactly one lifecycle event)
//! ```
//!
//! Registration happens once at startup through [`ServerBuilder`]; the
//! built server is an immutable `Arc` shared across workers and converts
//! into an `axum::Router` for any compliant HTTP runtime.

pub mod handler;
mod routes;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::config::ServerConfig;
use crate::encoding::Protocol;
use crate::envelope;
use crate::errors::ServerError;
use crate::events::{EventBus, Subscriber};
use crate::middleware::{CallOptions, Invocation, Middleware, MiddlewareStack, Terminal};
use crate::schema::{Reply, ResultStruct, Rpc, ServiceDescriptor, ThriftValue};

/// Failure channel for RPC handlers.
///
/// Schema-declared exceptions become a REPLY with the matching result
/// field set; anything else becomes an `ApplicationException` with the
/// `INTERNAL_ERROR` type code.
pub enum HandlerError {
    /// A schema-declared exception value.
    Exception(Arc<dyn ThriftValue>),
    /// An unhandled failure.
    Internal { class: String, message: String },
}

impl HandlerError {
    pub fn exception<E: ThriftValue>(exception: E) -> Self {
        HandlerError::Exception(Arc::new(exception))
    }

    pub fn internal<E: std::error::Error>(error: E) -> Self {
        let class = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error");
        HandlerError::Internal {
            class: class.to_string(),
            message: error.to_string(),
        }
    }
}

/// What one dispatch produced, ready for the HTTP layer.
pub(crate) struct EntryOutput {
    /// Serialised result struct for the 200 body.
    pub body: Bytes,
    /// The reply that was enveloped, for the lifecycle event.
    pub reply: Reply,
    /// Decoded args, for the lifecycle event.
    pub args: Arc<dyn ThriftValue>,
}

pub(crate) struct EntryFailure {
    pub error: ServerError,
    /// Present when args decoding succeeded before the failure.
    pub args: Option<Arc<dyn ThriftValue>>,
}

type EntryResult = Result<EntryOutput, EntryFailure>;

/// One registered RPC: decode, dispatch and envelope for a single
/// procedure, type erasure included.
pub(crate) type RpcEntry = Box<
    dyn Fn(Arc<MiddlewareStack<ServerError>>, Protocol, Bytes) -> BoxFuture<'static, EntryResult>
        + Send
        + Sync,
>;

pub(crate) struct ServerState {
    pub descriptor: ServiceDescriptor,
    pub rpcs: HashMap<&'static str, RpcEntry>,
    pub middleware: Arc<MiddlewareStack<ServerError>>,
    pub bus: EventBus,
    pub fallback: Option<axum::Router>,
    pub config: ServerConfig,
}

/// The request handler for one Thrift service, pluggable into any axum
/// (or raw hyper) server.
#[derive(Clone)]
pub struct ThtpServer {
    pub(crate) inner: Arc<ServerState>,
}

impl ThtpServer {
    pub fn builder(descriptor: ServiceDescriptor) -> ServerBuilder {
        ServerBuilder::new(descriptor)
    }

    /// The service this server exposes.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.inner.descriptor
    }

    /// Converts into an axum router carrying this server as state.
    pub fn into_router(self) -> axum::Router {
        handler::router(self)
    }

    /// Serves on the given listener until ctrl-c.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            service = self.inner.descriptor.name(),
            "thtp server starting"
        );
        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("thtp server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}

/// Startup-time registration of handlers, middleware and subscribers.
pub struct ServerBuilder {
    descriptor: ServiceDescriptor,
    rpcs: HashMap<&'static str, RpcEntry>,
    middleware: MiddlewareStack<ServerError>,
    bus: EventBus,
    fallback: Option<axum::Router>,
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            rpcs: HashMap::new(),
            middleware: MiddlewareStack::new(),
            bus: EventBus::new(),
            fallback: None,
            config: ServerConfig::default(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the handler for one RPC. The first registration of a
    /// name wins; later ones are ignored.
    ///
    /// # Panics
    /// Panics if the RPC is not declared by the service descriptor.
    pub fn handle<R, H, Fut>(mut self, handler: H) -> Self
    where
        R: Rpc,
        H: Fn(R::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Ret, HandlerError>> + Send + 'static,
    {
        if !self.descriptor.contains(R::NAME) {
            panic!(
                "rpc '{}' is not declared by service '{}'",
                R::NAME,
                self.descriptor.name()
            );
        }
        if self.rpcs.contains_key(R::NAME) {
            tracing::debug!(rpc = R::NAME, "handler already registered; keeping the first");
            return self;
        }
        let handler = Arc::new(handler);
        self.rpcs.insert(R::NAME, rpc_entry::<R, H, Fut>(handler));
        self
    }

    /// Appends a middleware; the first appended is outermost.
    pub fn middleware(mut self, middleware: impl Middleware<ServerError>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Appends a lifecycle-event subscriber.
    pub fn subscribe(mut self, subscriber: Arc<dyn Subscriber>) -> Self {
        self.bus.subscribe(subscriber);
        self
    }

    /// Wraps an inner application: requests outside the service route are
    /// forwarded to it instead of producing a bad-request exception.
    pub fn fallback(mut self, app: axum::Router) -> Self {
        self.fallback = Some(app);
        self
    }

    pub fn build(self) -> ThtpServer {
        ThtpServer {
            inner: Arc::new(ServerState {
                descriptor: self.descriptor,
                rpcs: self.rpcs,
                middleware: Arc::new(self.middleware),
                bus: self.bus,
                fallback: self.fallback,
                config: self.config,
            }),
        }
    }
}

fn rpc_entry<R, H, Fut>(handler: Arc<H>) -> RpcEntry
where
    R: Rpc,
    H: Fn(R::Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Ret, HandlerError>> + Send + 'static,
{
    Box::new(move |stack, protocol, body| {
        let handler = handler.clone();
        Box::pin(async move {
            let args: R::Args = envelope::read_args(body, protocol).map_err(|error| {
                EntryFailure {
                    error: ServerError::Deserialization(error),
                    args: None,
                }
            })?;
            let args_shared: Arc<dyn ThriftValue> = Arc::new(args);
            let options = CallOptions::new();
            let invocation = Invocation {
                rpc: R::NAME,
                args: args_shared.as_ref(),
                options: &options,
            };

            let terminal: Terminal<'_, ServerError> = Box::new(move |inv: Invocation<'_>| {
                let handler = handler.clone();
                let typed = inv
                    .args
                    .as_any()
                    .downcast_ref::<R::Args>()
                    .cloned();
                Box::pin(async move {
                    let args = typed.ok_or_else(|| {
                        ServerError::internal("TypeError", "args type mismatch in dispatch table")
                    })?;
                    match handler(args).await {
                        Ok(value) => Ok(if R::Result::VOID {
                            Reply::Void
                        } else {
                            Reply::value(value)
                        }),
                        Err(HandlerError::Exception(e)) => Ok(Reply::Exception(e)),
                        Err(HandlerError::Internal { class, message }) => {
                            Err(ServerError::Internal { class, message })
                        }
                    }
                })
            });

            // A panicking handler or middleware must not escape to the
            // HTTP runtime; it becomes an INTERNAL_ERROR exception.
            let dispatch = stack.dispatch(invocation, terminal);
            let reply = match std::panic::AssertUnwindSafe(dispatch).catch_unwind().await {
                Ok(Ok(reply)) => reply,
                Ok(Err(error)) => {
                    return Err(EntryFailure {
                        error,
                        args: Some(args_shared),
                    })
                }
                Err(panic) => {
                    return Err(EntryFailure {
                        error: ServerError::internal("panic", panic_message(panic.as_ref())),
                        args: Some(args_shared),
                    })
                }
            };

            let body = envelope::write_reply::<R::Result>(&reply, protocol).map_err(|error| {
                EntryFailure {
                    error,
                    args: Some(args_shared.clone()),
                }
            })?;
            Ok(EntryOutput {
                body,
                reply,
                args: args_shared,
            })
        })
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
