//! Ready-made lifecycle subscribers.

use crate::events::{InternalError, RpcError, RpcException, RpcSuccess, Subscriber};
use crate::observability::metrics::record_rpc;

/// Logs one structured line per RPC outcome.
pub struct LoggingSubscriber;

impl Subscriber for LoggingSubscriber {
    fn rpc_success(&self, event: &RpcSuccess) {
        tracing::info!(
            rpc = %event.rpc,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "rpc succeeded"
        );
    }

    fn rpc_exception(&self, event: &RpcException) {
        tracing::info!(
            rpc = %event.rpc,
            exception = event.exception.type_name(),
            elapsed_ms = event.elapsed.as_millis() as u64,
            "rpc raised a declared exception"
        );
    }

    fn rpc_error(&self, event: &RpcError) {
        tracing::warn!(
            rpc = event.rpc.as_deref().unwrap_or("-"),
            error = %event.error,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "rpc failed"
        );
    }

    fn internal_error(&self, event: &InternalError) {
        tracing::error!(
            rpc = event.rpc.as_deref().unwrap_or("-"),
            error = %event.error,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "unhandled error in rpc handler"
        );
    }
}

/// Feeds per-RPC counters and latency histograms to the metrics facade.
pub struct MetricsSubscriber;

impl Subscriber for MetricsSubscriber {
    fn rpc_success(&self, event: &RpcSuccess) {
        record_rpc(&event.rpc, "success", event.elapsed.as_secs_f64() * 1000.0);
    }

    fn rpc_exception(&self, event: &RpcException) {
        record_rpc(&event.rpc, "exception", event.elapsed.as_secs_f64() * 1000.0);
    }

    fn rpc_error(&self, event: &RpcError) {
        record_rpc(
            event.rpc.as_deref().unwrap_or("unknown"),
            "error",
            event.elapsed.as_secs_f64() * 1000.0,
        );
    }

    fn internal_error(&self, event: &InternalError) {
        record_rpc(
            event.rpc.as_deref().unwrap_or("unknown"),
            "internal_error",
            event.elapsed.as_secs_f64() * 1000.0,
        );
    }
}
