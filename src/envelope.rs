//! Envelope codec: the bridge between native argument/return values and
//! the schema's `<rpc>_args` / `<rpc>_result` wrapper structs.
//!
//! The subtle half lives in the generated [`ResultStruct`] impls: a
//! result carries at most one field, `success` denotes a normal return,
//! any other set field is a declared exception, and an empty result is a
//! void return. This module enforces those rules at the encode/decode
//! boundary and converts violations into the taxonomy's `BadResponse`
//! kind.

use bytes::Bytes;

use crate::encoding::Protocol;
use crate::errors::{ClientError, ServerError};
use crate::protocol::ProtocolError;
use crate::schema::{ApplicationException, Reply, ResultStruct, ThriftStruct};

/// Serialises an args struct for the request body.
///
/// Callers map failures onto their side of the taxonomy (`Serialization`
/// on the server, `Protocol` on the client).
pub fn write_args<A: ThriftStruct>(args: &A, protocol: Protocol) -> Result<Bytes, ProtocolError> {
    let mut writer = protocol.writer();
    args.write(writer.as_mut())?;
    writer.into_bytes()
}

/// Decodes a request body into the RPC's args struct.
pub fn read_args<A: ThriftStruct>(body: Bytes, protocol: Protocol) -> Result<A, ProtocolError> {
    let mut reader = protocol.reader(body)?;
    A::read(reader.as_mut())
}

/// Wraps a reply into the RPC's result struct and serialises it.
///
/// A void reply becomes an empty result struct. A value or exception is
/// routed into the field whose declared type matches; `success`
/// participates in that search on equal footing with the exception
/// fields. No match is a [`ServerError::BadResponse`].
pub fn write_reply<R: ResultStruct>(reply: &Reply, protocol: Protocol) -> Result<Bytes, ServerError> {
    let result = R::from_reply(reply).ok_or_else(|| {
        ServerError::BadResponse(format!(
            "no field of {} accepts a {} value",
            R::NAME,
            reply.kind_name()
        ))
    })?;
    let mut writer = protocol.writer();
    result
        .write(writer.as_mut())
        .map_err(ServerError::Serialization)?;
    writer.into_bytes().map_err(ServerError::Serialization)
}

/// Decodes a response body into a result struct and projects out the
/// first set field.
///
/// An empty result decodes to [`Reply::Void`] only when the struct
/// declares no `success` field; otherwise it is a
/// [`ClientError::BadResponse`].
pub fn read_reply<R: ResultStruct>(body: Bytes, protocol: Protocol) -> Result<Reply, ClientError> {
    let mut reader = protocol.reader(body)?;
    let result = R::read(reader.as_mut())?;
    result.into_reply().ok_or_else(|| {
        ClientError::BadResponse(format!("{} arrived with no field set", R::NAME))
    })
}

/// Serialises the schemaless exception envelope for a status-500 body.
pub fn write_exception(
    exception: &ApplicationException,
    protocol: Protocol,
) -> Result<Bytes, ServerError> {
    let mut writer = protocol.writer();
    exception
        .write(writer.as_mut())
        .map_err(ServerError::Serialization)?;
    writer.into_bytes().map_err(ServerError::Serialization)
}

/// Decodes a status-500 body back into an `ApplicationException`.
pub fn read_exception(body: Bytes, protocol: Protocol) -> Result<ApplicationException, ClientError> {
    let mut reader = protocol.reader(body)?;
    Ok(ApplicationException::read(reader.as_mut())?)
}
