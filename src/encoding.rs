//! Content-type negotiation.
//!
//! Maps the three Apache Thrift MIME types onto their wire protocols and
//! hands out reader/writer instances for whichever encoding a request
//! negotiated. Unknown or missing content types fall back to Compact,
//! which also guarantees a well-formed error body can always be emitted.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::protocol::{
    BinaryReader, BinaryWriter, CompactReader, CompactWriter, JsonReader, JsonWriter,
    ProtocolError, ProtocolReader, ProtocolWriter,
};

pub const BINARY_CONTENT_TYPE: &str = "application/vnd.apache.thrift.binary";
pub const COMPACT_CONTENT_TYPE: &str = "application/vnd.apache.thrift.compact";
pub const JSON_CONTENT_TYPE: &str = "application/vnd.apache.thrift.json";

/// A Thrift wire encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Binary,
    #[default]
    Compact,
    Json,
}

impl Protocol {
    /// Looks up the protocol bound to a `Content-Type` header value.
    ///
    /// Header parameters (`; charset=…`) are ignored; only the first
    /// `;`-delimited token participates.
    pub fn from_content_type(header: &str) -> Option<Protocol> {
        let mime = header.split(';').next().unwrap_or("").trim();
        match mime {
            BINARY_CONTENT_TYPE => Some(Protocol::Binary),
            COMPACT_CONTENT_TYPE => Some(Protocol::Compact),
            JSON_CONTENT_TYPE => Some(Protocol::Json),
            _ => None,
        }
    }

    /// The MIME type carried on requests and responses in this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            Protocol::Binary => BINARY_CONTENT_TYPE,
            Protocol::Compact => COMPACT_CONTENT_TYPE,
            Protocol::Json => JSON_CONTENT_TYPE,
        }
    }

    /// Creates an encoder for this protocol.
    pub fn writer(self) -> Box<dyn ProtocolWriter> {
        match self {
            Protocol::Binary => Box::new(BinaryWriter::new()),
            Protocol::Compact => Box::new(CompactWriter::new()),
            Protocol::Json => Box::new(JsonWriter::new()),
        }
    }

    /// Creates a decoder over a fully buffered body.
    pub fn reader(self, body: Bytes) -> Result<Box<dyn ProtocolReader>, ProtocolError> {
        Ok(match self {
            Protocol::Binary => Box::new(BinaryReader::new(body)),
            Protocol::Compact => Box::new(CompactReader::new(body)),
            Protocol::Json => Box::new(JsonReader::new(&body)?),
        })
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Protocol::Binary => "binary",
            Protocol::Compact => "compact",
            Protocol::Json => "json",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_mime_types_resolve() {
        assert_eq!(
            Protocol::from_content_type(BINARY_CONTENT_TYPE),
            Some(Protocol::Binary)
        );
        assert_eq!(
            Protocol::from_content_type(COMPACT_CONTENT_TYPE),
            Some(Protocol::Compact)
        );
        assert_eq!(
            Protocol::from_content_type(JSON_CONTENT_TYPE),
            Some(Protocol::Json)
        );
    }

    #[test]
    fn parameters_are_ignored() {
        assert_eq!(
            Protocol::from_content_type("application/vnd.apache.thrift.json; charset=utf-8"),
            Some(Protocol::Json)
        );
        assert_eq!(
            Protocol::from_content_type(" application/vnd.apache.thrift.binary ;q=1"),
            Some(Protocol::Binary)
        );
    }

    #[test]
    fn unknown_types_resolve_to_nothing() {
        assert_eq!(Protocol::from_content_type("application/json"), None);
        assert_eq!(Protocol::from_content_type(""), None);
    }

    #[test]
    fn default_is_compact() {
        assert_eq!(Protocol::default(), Protocol::Compact);
    }

    #[test]
    fn content_type_is_inverse_of_lookup() {
        for protocol in [Protocol::Binary, Protocol::Compact, Protocol::Json] {
            assert_eq!(
                Protocol::from_content_type(protocol.content_type()),
                Some(protocol)
            );
        }
    }
}
