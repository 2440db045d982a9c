//! Observability plumbing.
//!
//! # Data Flow
//! ```text
//! server lifecycle events
//!     → subscribers.rs (LoggingSubscriber → tracing,
//!                       MetricsSubscriber → metrics facade)
//!
//! client calls
//!     → metrics.rs (TimingMiddleware → latency histograms)
//!
//! metrics facade
//!     → metrics.rs (optional Prometheus exporter)
//! ```
//!
//! The RPC core stays free of sinks: everything here attaches through
//! the public subscriber and middleware contracts.

pub mod metrics;
pub mod subscribers;

pub use metrics::TimingMiddleware;
pub use subscribers::{LoggingSubscriber, MetricsSubscriber};
