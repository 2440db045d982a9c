//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Instant;

use futures_util::future::BoxFuture;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::middleware::{Invocation, Middleware, Next};

/// Initialize the Prometheus exporter and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!("metrics server listening on http://{}", addr);
    Ok(())
}

/// Record one server-side RPC outcome.
pub fn record_rpc(rpc: &str, outcome: &'static str, elapsed_ms: f64) {
    let labels = [("rpc", rpc.to_string()), ("outcome", outcome.to_string())];

    counter!("thtp_server_requests_total", &labels).increment(1);
    histogram!("thtp_server_request_duration_ms", &labels).record(elapsed_ms);
}

/// Client-side timing middleware: a latency histogram and a call counter
/// per RPC, labelled by outcome.
pub struct TimingMiddleware;

impl<E: Send + 'static> Middleware<E> for TimingMiddleware {
    fn call<'a>(
        &'a self,
        invocation: Invocation<'a>,
        next: Next<'a, E>,
    ) -> BoxFuture<'a, Result<crate::schema::Reply, E>> {
        Box::pin(async move {
            let started = Instant::now();
            let result = next.run(invocation).await;
            let outcome = if result.is_ok() { "ok" } else { "error" };
            let labels = [
                ("rpc", invocation.rpc.to_string()),
                ("outcome", outcome.to_string()),
            ];
            counter!("thtp_client_calls_total", &labels).increment(1);
            histogram!("thtp_client_call_duration_ms", &labels)
                .record(started.elapsed().as_secs_f64() * 1000.0);
            result
        })
    }
}
