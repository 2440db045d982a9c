//! Error taxonomy.
//!
//! Two sealed families: [`ServerError`] kinds all serialise as HTTP 500
//! with an `ApplicationException` body whose type code identifies the
//! kind; [`ClientError`] kinds surface transport and decode failures to
//! callers and re-raise schema-declared exceptions. Schema-declared
//! exceptions themselves are not errors at the wire level — they travel
//! as ordinary 200 replies.

use std::fmt;
use std::sync::Arc;

use crate::protocol::ProtocolError;
use crate::schema::{ApplicationException, ExceptionType, ThriftValue, ValidationError};

/// A failure the server maps onto an `EXCEPTION` (status 500) response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    /// Method was not POST, or the path did not match the service route.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Path matched the service prefix but the RPC is not declared.
    #[error("Unknown RPC '{0}'")]
    UnknownRpc(String),

    /// No result field matches the reply value.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// Encode failure.
    #[error("serialization failed: {0}")]
    Serialization(ProtocolError),

    /// Decode failure: protocol exception or premature end of stream.
    #[error("deserialization failed: {0}")]
    Deserialization(ProtocolError),

    /// Schema `validate()` rejected inbound args or an outbound result.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Any otherwise-unhandled failure inside a handler.
    #[error("Internal error ({class}): {message}")]
    Internal { class: String, message: String },
}

impl ServerError {
    pub fn internal(class: impl Into<String>, message: impl fmt::Display) -> Self {
        ServerError::Internal {
            class: class.into(),
            message: message.to_string(),
        }
    }

    /// The Thrift application-exception type code for this kind.
    pub fn exception_type(&self) -> ExceptionType {
        match self {
            ServerError::BadRequest(_) => ExceptionType::UnknownMethod,
            ServerError::UnknownRpc(_) => ExceptionType::WrongMethodName,
            ServerError::BadResponse(_) => ExceptionType::MissingResult,
            ServerError::Serialization(_) | ServerError::Deserialization(_) => {
                ExceptionType::ProtocolError
            }
            ServerError::Validation(_) => ExceptionType::Unknown,
            ServerError::Internal { .. } => ExceptionType::InternalError,
        }
    }

    /// The wire form of this error.
    pub fn to_application_exception(&self) -> ApplicationException {
        ApplicationException::new(self.exception_type(), self.to_string())
    }
}

/// A schema-declared exception re-raised to the caller, type-erased the
/// way it crossed the middleware chain.
#[derive(Clone)]
pub struct DeclaredException(pub Arc<dyn ThriftValue>);

impl DeclaredException {
    /// The exception, if it has the expected generated type.
    pub fn get<E: Clone + 'static>(&self) -> Option<E> {
        self.0.as_any().downcast_ref::<E>().cloned()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }
}

impl fmt::Debug for DeclaredException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeclaredException({})", self.0.type_name())
    }
}

impl fmt::Display for DeclaredException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.type_name())
    }
}

/// A failure surfaced to the RPC caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server replied with a schema-declared exception (status 200).
    #[error("rpc raised {0}")]
    Exception(DeclaredException),

    /// The server replied with an `ApplicationException` (status 500).
    #[error("server exception: {0}")]
    Application(ApplicationException),

    /// Response status was neither 200 nor 500.
    #[error("unexpected response status {status}")]
    UnknownMessageType { status: u16 },

    /// Connection refused or connect timeout; also raised when the pool
    /// checkout times out.
    #[error("server unreachable: {0}")]
    ServerUnreachable(String),

    /// Receive timeout on an in-flight call. Carries the RPC name.
    #[error("rpc timed out: {0}")]
    RpcTimeout(String),

    /// Schema `validate()` rejected the args before send.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Result struct had no field set, or no field matched the value.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// The response body did not decode in the negotiated protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The client could not be assembled from its configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_match_taxonomy() {
        let cases = [
            (
                ServerError::BadRequest("GET /x".into()),
                ExceptionType::UnknownMethod,
            ),
            (
                ServerError::UnknownRpc("ponder".into()),
                ExceptionType::WrongMethodName,
            ),
            (
                ServerError::BadResponse("no field".into()),
                ExceptionType::MissingResult,
            ),
            (
                ServerError::Serialization(ProtocolError::Eof),
                ExceptionType::ProtocolError,
            ),
            (
                ServerError::Deserialization(ProtocolError::Eof),
                ExceptionType::ProtocolError,
            ),
            (
                ServerError::Validation(ValidationError("zero".into())),
                ExceptionType::Unknown,
            ),
            (
                ServerError::internal("Oops", "boom"),
                ExceptionType::InternalError,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.exception_type(), code, "{err}");
        }
    }

    #[test]
    fn unknown_rpc_message_shape() {
        let ax = ServerError::UnknownRpc("ponder".into()).to_application_exception();
        assert_eq!(ax.message, "Unknown RPC 'ponder'");
        assert_eq!(ax.exception_type, ExceptionType::WrongMethodName);
    }

    #[test]
    fn internal_error_message_shape() {
        let ax = ServerError::internal("DivisionError", "divided by 0").to_application_exception();
        assert_eq!(ax.message, "Internal error (DivisionError): divided by 0");
    }
}
