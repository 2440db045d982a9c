//! Client half of the gateway.
//!
//! # Data Flow
//! ```text
//! call::<R>(args)
//!     → middleware chain (same shape as the server's)
//!     → terminal: serialise args → pool checkout → POST /<rpc>
//!       → status dispatch (200 reply / 500 exception / other)
//!     ← typed return value, or a raised declared exception
//! ```
//!
//! Generated service wrappers expose one positional method per RPC on
//! top of [`ThtpClient::call`]. The client is cheap to clone-by-`Arc`
//! and safe to call from any worker concurrently; the pool is the
//! serialisation point.

pub mod pool;

pub use pool::{ConnectionPool, PooledConnection};

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;

use crate::config::ClientConfig;
use crate::encoding::Protocol;
use crate::envelope;
use crate::errors::{ClientError, DeclaredException};
use crate::middleware::{CallOptions, Invocation, Middleware, MiddlewareStack, Terminal};
use crate::schema::{Reply, Rpc, ServiceDescriptor, ThriftValue};

/// Startup-time assembly of a client.
pub struct ClientBuilder {
    descriptor: ServiceDescriptor,
    config: ClientConfig,
    middleware: MiddlewareStack<ClientError>,
}

impl ClientBuilder {
    /// Appends a middleware; the first appended is outermost.
    pub fn middleware(mut self, middleware: impl Middleware<ClientError>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> Result<ThtpClient, ClientError> {
        self.config.validate().map_err(|errors| {
            let detail: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ClientError::Config(detail.join("; "))
        })?;
        let pool = ConnectionPool::new(&self.config, self.descriptor.name())?;
        Ok(ThtpClient {
            descriptor: self.descriptor,
            protocol: self.config.protocol,
            pool,
            middleware: self.middleware,
        })
    }
}

/// RPC client for one service.
pub struct ThtpClient {
    descriptor: ServiceDescriptor,
    protocol: Protocol,
    pool: ConnectionPool,
    middleware: MiddlewareStack<ClientError>,
}

impl ThtpClient {
    pub fn builder(descriptor: ServiceDescriptor, config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            descriptor,
            config,
            middleware: MiddlewareStack::new(),
        }
    }

    /// Builds a client with no middleware.
    pub fn new(descriptor: ServiceDescriptor, config: ClientConfig) -> Result<Self, ClientError> {
        Self::builder(descriptor, config).build()
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Invokes one RPC.
    ///
    /// Schema-declared exceptions surface as
    /// [`ClientError::Exception`]; the generated wrapper downcasts them
    /// back to their declared types.
    pub async fn call<R: Rpc>(&self, args: R::Args) -> Result<R::Ret, ClientError> {
        debug_assert!(
            self.descriptor.contains(R::NAME),
            "rpc '{}' is not declared by service '{}'",
            R::NAME,
            self.descriptor.name()
        );

        let args_shared: Arc<dyn ThriftValue> = Arc::new(args);
        let options = CallOptions::new();
        let invocation = Invocation {
            rpc: R::NAME,
            args: args_shared.as_ref(),
            options: &options,
        };
        let terminal: Terminal<'_, ClientError> =
            Box::new(move |inv| Box::pin(self.dispatch::<R>(inv)));

        let reply = self.middleware.dispatch(invocation, terminal).await?;
        match reply {
            Reply::Value(value) => {
                value.as_any().downcast_ref::<R::Ret>().cloned().ok_or_else(|| {
                    ClientError::BadResponse(format!(
                        "success value has type {}, expected one matching '{}'",
                        value.type_name(),
                        R::NAME
                    ))
                })
            }
            Reply::Void => (&() as &dyn std::any::Any)
                .downcast_ref::<R::Ret>()
                .cloned()
                .ok_or_else(|| {
                    ClientError::BadResponse(format!("void reply for non-void rpc '{}'", R::NAME))
                }),
            Reply::Exception(exception) => {
                Err(ClientError::Exception(DeclaredException(exception)))
            }
        }
    }

    /// Terminal dispatcher: the actual HTTP exchange.
    async fn dispatch<R: Rpc>(&self, invocation: Invocation<'_>) -> Result<Reply, ClientError> {
        let args = invocation
            .args
            .as_any()
            .downcast_ref::<R::Args>()
            .ok_or_else(|| ClientError::Transport("args type mismatch in dispatch".into()))?;
        let body = envelope::write_args(args, self.protocol)?;

        let connection = self.pool.checkout().await?;
        let response = connection
            .post(R::NAME, self.protocol, body)
            .await
            .map_err(|e| transport_error(e, R::NAME))?;

        let status = response.status().as_u16();
        let response_protocol = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Protocol::from_content_type)
            .unwrap_or(self.protocol);
        let payload = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, R::NAME))?;
        // The slot was held through the body read; release it now.
        drop(connection);

        tracing::debug!(
            rpc = R::NAME,
            status,
            protocol = %response_protocol,
            body_len = payload.len(),
            "rpc response received"
        );

        match status {
            200 => envelope::read_reply::<R::Result>(payload, response_protocol),
            500 => Err(ClientError::Application(envelope::read_exception(
                payload,
                response_protocol,
            )?)),
            status => Err(ClientError::UnknownMessageType { status }),
        }
    }
}

/// Maps transport-level failures onto the client taxonomy. Connect
/// failures (refusal or connect timeout) mean the server is unreachable;
/// a receive timeout aborts the call and names the RPC.
fn transport_error(error: reqwest::Error, rpc: &str) -> ClientError {
    if error.is_connect() {
        ClientError::ServerUnreachable(error.to_string())
    } else if error.is_timeout() {
        ClientError::RpcTimeout(rpc.to_string())
    } else {
        ClientError::Transport(error.to_string())
    }
}
