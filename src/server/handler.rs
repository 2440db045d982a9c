//! HTTP entry point: one catch-all handler performing the request steps
//! exactly once each.
//!
//! 1. Protocol selection from `Content-Type` (Compact when absent or
//!    unrecognised; error replies reuse the decoded request protocol).
//! 2. Route match: `POST /<service_path>/<rpc_name>[/]`. Foreign paths
//!    fall through to the wrapped application when one is configured.
//! 3. Args decode, 4. middleware dispatch, 5. reply envelope — inside
//!    the per-RPC entry.
//! 6. Taxonomy errors serialise as an `ApplicationException` at 500.
//! 7. Exactly one lifecycle event, published after the response is
//!    built.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use tower::util::ServiceExt;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::routes;
use super::{EntryFailure, EntryOutput, ServerState, ThtpServer};
use crate::encoding::Protocol;
use crate::envelope;
use crate::errors::ServerError;
use crate::events::{Event, InternalError, RequestInfo, RpcError, RpcException, RpcSuccess};
use crate::protocol::ProtocolError;
use crate::schema::{Reply, ThriftValue};

pub(crate) fn router(server: ThtpServer) -> Router {
    Router::new()
        .route("/", any(handle))
        .route("/{*path}", any(handle))
        .with_state(server)
        .layer(TraceLayer::new_for_http())
}

async fn handle(State(server): State<ThtpServer>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let state = server.inner.as_ref();

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let info = RequestInfo {
        method: request.method().clone(),
        uri: request.uri().clone(),
        headers: request.headers().clone(),
    };

    let requested = info
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(Protocol::from_content_type);
    let protocol = requested.unwrap_or_default();

    if state.config.health_endpoint
        && info.method == Method::GET
        && routes::is_health(info.uri.path())
    {
        return ([(header::CONTENT_TYPE, "text/plain")], "Everything is OK").into_response();
    }

    let Some(rpc) = routes::match_rpc(state.descriptor.name(), info.uri.path()) else {
        // Not a THTP route: hand over to the wrapped application, or
        // reject in terminal mode.
        if let Some(app) = &state.fallback {
            return match app.clone().oneshot(request).await {
                Ok(response) => response,
                Err(infallible) => match infallible {},
            };
        }
        let error = ServerError::BadRequest(format!(
            "no route for {} {}",
            info.method,
            info.uri.path()
        ));
        return error_response(
            state,
            FailureContext {
                protocol,
                request_id,
                request: info,
                rpc: None,
                args: None,
                error,
                started,
            },
        );
    };
    let rpc = rpc.to_string();

    if info.method != Method::POST {
        let error = ServerError::BadRequest(format!("method {} not allowed", info.method));
        return error_response(
            state,
            FailureContext {
                protocol,
                request_id,
                request: info,
                rpc: Some(rpc),
                args: None,
                error,
                started,
            },
        );
    }

    let Some(entry) = state.rpcs.get(rpc.as_str()) else {
        let error = ServerError::UnknownRpc(rpc.clone());
        return error_response(
            state,
            FailureContext {
                protocol,
                request_id,
                request: info,
                rpc: Some(rpc),
                args: None,
                error,
                started,
            },
        );
    };

    let body = match axum::body::to_bytes(request.into_body(), state.config.max_body_size).await {
        Ok(body) => body,
        Err(error) => {
            let error = ServerError::Deserialization(ProtocolError::Malformed(error.to_string()));
            return error_response(
                state,
                FailureContext {
                    protocol,
                    request_id,
                    request: info,
                    rpc: Some(rpc),
                    args: None,
                    error,
                    started,
                },
            );
        }
    };

    tracing::debug!(
        request_id = %request_id,
        rpc = %rpc,
        %protocol,
        body_len = body.len(),
        "dispatching rpc"
    );

    match entry(state.middleware.clone(), protocol, body).await {
        Ok(EntryOutput { body, reply, args }) => {
            let response = build_response(StatusCode::OK, protocol, &request_id, body);
            let elapsed = started.elapsed();
            let event = match reply {
                Reply::Exception(exception) => Event::Exception(RpcException {
                    request: info,
                    rpc,
                    args,
                    exception,
                    elapsed,
                }),
                other => Event::Success(RpcSuccess {
                    request: info,
                    rpc,
                    args,
                    reply: other,
                    elapsed,
                }),
            };
            state.bus.publish(&event);
            response
        }
        Err(EntryFailure { error, args }) => error_response(
            state,
            FailureContext {
                protocol,
                request_id,
                request: info,
                rpc: Some(rpc),
                args,
                error,
                started,
            },
        ),
    }
}

struct FailureContext {
    protocol: Protocol,
    request_id: String,
    request: RequestInfo,
    rpc: Option<String>,
    args: Option<Arc<dyn ThriftValue>>,
    error: ServerError,
    started: Instant,
}

/// Serialises a taxonomy error as an EXCEPTION response and publishes
/// the matching lifecycle event.
fn error_response(state: &ServerState, ctx: FailureContext) -> Response {
    let FailureContext {
        protocol,
        request_id,
        request,
        rpc,
        args,
        error,
        started,
    } = ctx;

    tracing::warn!(
        request_id = %request_id,
        rpc = rpc.as_deref().unwrap_or("-"),
        %error,
        "rpc failed"
    );

    let exception = error.to_application_exception();
    let body = match envelope::write_exception(&exception, protocol) {
        Ok(body) => body,
        Err(encode_error) => {
            // The exception envelope itself failed to encode; send an
            // empty 500 body rather than nothing at all.
            tracing::error!(request_id = %request_id, %encode_error, "failed to encode exception body");
            Bytes::new()
        }
    };
    let response = build_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        protocol,
        &request_id,
        body,
    );

    let elapsed = started.elapsed();
    let event = if matches!(error, ServerError::Internal { .. }) {
        Event::Internal(InternalError {
            request,
            rpc,
            args,
            error,
            elapsed,
        })
    } else {
        Event::Error(RpcError {
            request,
            rpc,
            args,
            error,
            elapsed,
        })
    };
    state.bus.publish(&event);
    response
}

fn build_response(
    status: StatusCode,
    protocol: Protocol,
    request_id: &str,
    body: Bytes,
) -> Response {
    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(protocol.content_type()),
    );
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response
            .headers_mut()
            .insert(header::HeaderName::from_static("x-request-id"), value);
    }
    response
}
