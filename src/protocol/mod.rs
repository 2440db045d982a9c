//! Thrift wire protocols.
//!
//! # Data Flow
//! ```text
//! Encode:
//!     generated struct
//!     → ProtocolWriter (binary.rs | compact.rs | json.rs)
//!     → Bytes (HTTP body)
//!
//! Decode:
//!     Bytes (HTTP body)
//!     → ProtocolReader
//!     → generated struct (unknown fields skipped)
//! ```
//!
//! The three encodings share one reader/writer contract so the envelope
//! codec and generated code stay protocol-agnostic. Structs are carried
//! bare on the wire: the RPC name travels in the URL path, so there is no
//! Thrift message envelope.

pub mod binary;
pub mod compact;
pub mod json;

pub use binary::{BinaryReader, BinaryWriter};
pub use compact::{CompactReader, CompactWriter};
pub use json::{JsonReader, JsonWriter};

use bytes::Bytes;

/// Nesting depth cap when skipping unknown fields.
const MAX_SKIP_DEPTH: usize = 64;

/// Error type for wire encode/decode failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// Input ended before the value was complete.
    #[error("unexpected end of input")]
    Eof,

    /// A type code not defined by the protocol.
    #[error("unknown type code {0}")]
    UnknownType(u8),

    /// A negative or absurd size header.
    #[error("invalid size {0}")]
    InvalidSize(i64),

    /// String data that is not UTF-8.
    #[error("invalid utf-8 in string")]
    Utf8,

    /// Binary field that is not valid base64 (JSON protocol).
    #[error("invalid base64 in binary field")]
    Base64,

    /// Unknown fields nested deeper than the skip limit.
    #[error("nesting depth limit exceeded")]
    DepthLimit,

    /// Anything else structurally wrong with the document.
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Thrift field/element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TType {
    Stop,
    Bool,
    I8,
    Double,
    I16,
    I32,
    I64,
    String,
    Struct,
    Map,
    Set,
    List,
}

/// Writer half of a wire protocol. Object-safe so dispatch tables can hold
/// any encoding behind one pointer.
pub trait ProtocolWriter: Send {
    fn write_struct_begin(&mut self) -> Result<(), ProtocolError>;
    fn write_struct_end(&mut self) -> Result<(), ProtocolError>;
    fn write_field_begin(&mut self, ttype: TType, id: i16) -> Result<(), ProtocolError>;
    fn write_field_end(&mut self) -> Result<(), ProtocolError>;
    /// Terminates the field list of the current struct.
    fn write_stop(&mut self) -> Result<(), ProtocolError>;

    fn write_bool(&mut self, v: bool) -> Result<(), ProtocolError>;
    fn write_i8(&mut self, v: i8) -> Result<(), ProtocolError>;
    fn write_i16(&mut self, v: i16) -> Result<(), ProtocolError>;
    fn write_i32(&mut self, v: i32) -> Result<(), ProtocolError>;
    fn write_i64(&mut self, v: i64) -> Result<(), ProtocolError>;
    fn write_double(&mut self, v: f64) -> Result<(), ProtocolError>;
    fn write_string(&mut self, v: &str) -> Result<(), ProtocolError>;
    fn write_binary(&mut self, v: &[u8]) -> Result<(), ProtocolError>;

    fn write_list_begin(&mut self, elem: TType, len: usize) -> Result<(), ProtocolError>;
    fn write_list_end(&mut self) -> Result<(), ProtocolError>;
    fn write_set_begin(&mut self, elem: TType, len: usize) -> Result<(), ProtocolError>;
    fn write_set_end(&mut self) -> Result<(), ProtocolError>;
    fn write_map_begin(
        &mut self,
        key: TType,
        value: TType,
        len: usize,
    ) -> Result<(), ProtocolError>;
    fn write_map_end(&mut self) -> Result<(), ProtocolError>;

    /// Consumes the writer, yielding the encoded document.
    fn into_bytes(self: Box<Self>) -> Result<Bytes, ProtocolError>;
}

/// Reader half of a wire protocol.
pub trait ProtocolReader: Send {
    fn read_struct_begin(&mut self) -> Result<(), ProtocolError>;
    fn read_struct_end(&mut self) -> Result<(), ProtocolError>;
    /// Returns `None` when the struct's field list is exhausted.
    fn read_field_begin(&mut self) -> Result<Option<(TType, i16)>, ProtocolError>;
    fn read_field_end(&mut self) -> Result<(), ProtocolError>;

    fn read_bool(&mut self) -> Result<bool, ProtocolError>;
    fn read_i8(&mut self) -> Result<i8, ProtocolError>;
    fn read_i16(&mut self) -> Result<i16, ProtocolError>;
    fn read_i32(&mut self) -> Result<i32, ProtocolError>;
    fn read_i64(&mut self) -> Result<i64, ProtocolError>;
    fn read_double(&mut self) -> Result<f64, ProtocolError>;
    fn read_string(&mut self) -> Result<String, ProtocolError>;
    fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError>;

    fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError>;
    fn read_list_end(&mut self) -> Result<(), ProtocolError>;
    fn read_set_begin(&mut self) -> Result<(TType, usize), ProtocolError>;
    fn read_set_end(&mut self) -> Result<(), ProtocolError>;
    fn read_map_begin(&mut self) -> Result<(TType, TType, usize), ProtocolError>;
    fn read_map_end(&mut self) -> Result<(), ProtocolError>;
}

/// Skips one value of the given type, recursing into containers.
///
/// Decoders call this for field ids they do not recognise, which keeps old
/// readers compatible with newer schemas.
pub fn skip(reader: &mut dyn ProtocolReader, ttype: TType) -> Result<(), ProtocolError> {
    skip_depth(reader, ttype, 0)
}

fn skip_depth(
    reader: &mut dyn ProtocolReader,
    ttype: TType,
    depth: usize,
) -> Result<(), ProtocolError> {
    if depth > MAX_SKIP_DEPTH {
        return Err(ProtocolError::DepthLimit);
    }
    match ttype {
        TType::Stop => Err(ProtocolError::Malformed("cannot skip a stop field".into())),
        TType::Bool => reader.read_bool().map(drop),
        TType::I8 => reader.read_i8().map(drop),
        TType::I16 => reader.read_i16().map(drop),
        TType::I32 => reader.read_i32().map(drop),
        TType::I64 => reader.read_i64().map(drop),
        TType::Double => reader.read_double().map(drop),
        TType::String => reader.read_binary().map(drop),
        TType::Struct => {
            reader.read_struct_begin()?;
            while let Some((field_type, _)) = reader.read_field_begin()? {
                skip_depth(reader, field_type, depth + 1)?;
                reader.read_field_end()?;
            }
            reader.read_struct_end()
        }
        TType::List => {
            let (elem, len) = reader.read_list_begin()?;
            for _ in 0..len {
                skip_depth(reader, elem, depth + 1)?;
            }
            reader.read_list_end()
        }
        TType::Set => {
            let (elem, len) = reader.read_set_begin()?;
            for _ in 0..len {
                skip_depth(reader, elem, depth + 1)?;
            }
            reader.read_set_end()
        }
        TType::Map => {
            let (key, value, len) = reader.read_map_begin()?;
            for _ in 0..len {
                skip_depth(reader, key, depth + 1)?;
                skip_depth(reader, value, depth + 1)?;
            }
            reader.read_map_end()
        }
    }
}
