//! Thrift-RPC over HTTP.
//!
//! A symmetric client/server pair that carries Thrift `<rpc>_args` /
//! `<rpc>_result` structs as HTTP/1.1 POST bodies over persistent
//! connections, negotiating among the binary, compact and JSON wire
//! encodings via content type. HTTP supplies the ergonomics — routing,
//! headers, status codes, L7 proxies, curl — while the schema's RPC
//! semantics stay intact: declared exceptions are first-class replies
//! (status 200), everything out of schema is an `ApplicationException`
//! (status 500).
//!
//! ```text
//!   client                                server
//!   call::<R>(args)                       axum route /{*path}
//!     → middleware chain                    → protocol selection
//!     → envelope codec                      → route parse
//!     → connection pool          HTTP       → middleware chain
//!     → POST /<service>/<rpc>  ────────▶    → envelope codec
//!     ◀─ 200 result / 500 exception ────    → registered handler
//!     → typed value or raised exception     → one lifecycle event
//! ```

// Wire format and schema contract
pub mod encoding;
pub mod envelope;
pub mod protocol;
pub mod schema;

// Dispatch pipeline
pub mod errors;
pub mod events;
pub mod middleware;

// Client and server halves
pub mod client;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use client::ThtpClient;
pub use config::{ClientConfig, ServerConfig};
pub use encoding::Protocol;
pub use errors::{ClientError, ServerError};
pub use schema::{ApplicationException, ExceptionType, Reply, ServiceDescriptor};
pub use server::{HandlerError, ThtpServer};
