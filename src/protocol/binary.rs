//! Thrift binary protocol (strict encoding).
//!
//! Fixed-width big-endian integers, one type byte plus an i16 field id per
//! field, i32 length prefixes on strings and containers, a zero byte
//! terminating each struct.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{ProtocolError, ProtocolReader, ProtocolWriter, TType};

// Wire type codes shared by field headers and container element types.
const STOP: u8 = 0x00;
const BOOL: u8 = 0x02;
const I8: u8 = 0x03;
const DOUBLE: u8 = 0x04;
const I16: u8 = 0x06;
const I32: u8 = 0x08;
const I64: u8 = 0x0A;
const STRING: u8 = 0x0B;
const STRUCT: u8 = 0x0C;
const MAP: u8 = 0x0D;
const SET: u8 = 0x0E;
const LIST: u8 = 0x0F;

/// Largest accepted string/container length header. Guards against
/// allocating on a corrupt length prefix.
const MAX_CLAIMED_LEN: i32 = 64 * 1024 * 1024;

fn type_code(ttype: TType) -> u8 {
    match ttype {
        TType::Stop => STOP,
        TType::Bool => BOOL,
        TType::I8 => I8,
        TType::Double => DOUBLE,
        TType::I16 => I16,
        TType::I32 => I32,
        TType::I64 => I64,
        TType::String => STRING,
        TType::Struct => STRUCT,
        TType::Map => MAP,
        TType::Set => SET,
        TType::List => LIST,
    }
}

fn ttype_from_code(code: u8) -> Result<TType, ProtocolError> {
    match code {
        STOP => Ok(TType::Stop),
        BOOL => Ok(TType::Bool),
        I8 => Ok(TType::I8),
        DOUBLE => Ok(TType::Double),
        I16 => Ok(TType::I16),
        I32 => Ok(TType::I32),
        I64 => Ok(TType::I64),
        STRING => Ok(TType::String),
        STRUCT => Ok(TType::Struct),
        MAP => Ok(TType::Map),
        SET => Ok(TType::Set),
        LIST => Ok(TType::List),
        other => Err(ProtocolError::UnknownType(other)),
    }
}

fn check_len(len: i32) -> Result<usize, ProtocolError> {
    if !(0..=MAX_CLAIMED_LEN).contains(&len) {
        return Err(ProtocolError::InvalidSize(len as i64));
    }
    Ok(len as usize)
}

/// Binary protocol encoder.
#[derive(Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer, yielding the encoded document.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl ProtocolWriter for BinaryWriter {
    fn write_struct_begin(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_field_begin(&mut self, ttype: TType, id: i16) -> Result<(), ProtocolError> {
        self.buf.put_u8(type_code(ttype));
        self.buf.put_i16(id);
        Ok(())
    }

    fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_stop(&mut self) -> Result<(), ProtocolError> {
        self.buf.put_u8(STOP);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<(), ProtocolError> {
        self.buf.put_u8(v as u8);
        Ok(())
    }

    fn write_i8(&mut self, v: i8) -> Result<(), ProtocolError> {
        self.buf.put_i8(v);
        Ok(())
    }

    fn write_i16(&mut self, v: i16) -> Result<(), ProtocolError> {
        self.buf.put_i16(v);
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<(), ProtocolError> {
        self.buf.put_i32(v);
        Ok(())
    }

    fn write_i64(&mut self, v: i64) -> Result<(), ProtocolError> {
        self.buf.put_i64(v);
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<(), ProtocolError> {
        self.buf.put_f64(v);
        Ok(())
    }

    fn write_string(&mut self, v: &str) -> Result<(), ProtocolError> {
        self.write_binary(v.as_bytes())
    }

    fn write_binary(&mut self, v: &[u8]) -> Result<(), ProtocolError> {
        if v.len() > MAX_CLAIMED_LEN as usize {
            return Err(ProtocolError::InvalidSize(v.len() as i64));
        }
        self.buf.put_i32(v.len() as i32);
        self.buf.put_slice(v);
        Ok(())
    }

    fn write_list_begin(&mut self, elem: TType, len: usize) -> Result<(), ProtocolError> {
        self.buf.put_u8(type_code(elem));
        self.buf.put_i32(len as i32);
        Ok(())
    }

    fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_set_begin(&mut self, elem: TType, len: usize) -> Result<(), ProtocolError> {
        self.write_list_begin(elem, len)
    }

    fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_map_begin(
        &mut self,
        key: TType,
        value: TType,
        len: usize,
    ) -> Result<(), ProtocolError> {
        self.buf.put_u8(type_code(key));
        self.buf.put_u8(type_code(value));
        self.buf.put_i32(len as i32);
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn into_bytes(self: Box<Self>) -> Result<Bytes, ProtocolError> {
        Ok(self.buf.freeze())
    }
}

/// Binary protocol decoder over an in-memory body.
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            return Err(ProtocolError::Eof);
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(n)?;
        Ok(self.buf.split_to(n))
    }
}

impl ProtocolReader for BinaryReader {
    fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<Option<(TType, i16)>, ProtocolError> {
        self.ensure(1)?;
        let code = self.buf.get_u8();
        if code == STOP {
            return Ok(None);
        }
        let ttype = ttype_from_code(code)?;
        self.ensure(2)?;
        let id = self.buf.get_i16();
        Ok(Some((ttype, id)))
    }

    fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8() != 0)
    }

    fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_i8())
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    fn read_double(&mut self) -> Result<f64, ProtocolError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let raw = self.read_binary()?;
        String::from_utf8(raw).map_err(|_| ProtocolError::Utf8)
    }

    fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.ensure(4)?;
        let len = check_len(self.buf.get_i32())?;
        Ok(self.take(len)?.to_vec())
    }

    fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        self.ensure(5)?;
        let elem = ttype_from_code(self.buf.get_u8())?;
        let len = check_len(self.buf.get_i32())?;
        Ok((elem, len))
    }

    fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        self.read_list_begin()
    }

    fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_map_begin(&mut self) -> Result<(TType, TType, usize), ProtocolError> {
        self.ensure(6)?;
        let key = ttype_from_code(self.buf.get_u8())?;
        let value = ttype_from_code(self.buf.get_u8())?;
        let len = check_len(self.buf.get_i32())?;
        Ok((key, value, len))
    }

    fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::skip;

    #[test]
    fn i32_field_layout() {
        let mut w = BinaryWriter::new();
        w.write_struct_begin().unwrap();
        w.write_field_begin(TType::I32, 1).unwrap();
        w.write_i32(5).unwrap();
        w.write_field_end().unwrap();
        w.write_stop().unwrap();
        w.write_struct_end().unwrap();

        assert_eq!(
            w.finish().as_ref(),
            &[0x08, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x00]
        );
    }

    #[test]
    fn string_roundtrip_preserves_utf8() {
        let mut w = BinaryWriter::new();
        w.write_string("héllo").unwrap();
        let mut r = BinaryReader::new(w.finish());
        assert_eq!(r.read_string().unwrap(), "héllo");
    }

    #[test]
    fn truncated_input_is_eof() {
        let mut r = BinaryReader::new(Bytes::from_static(&[0x08, 0x00]));
        assert_eq!(r.read_field_begin().unwrap_err(), ProtocolError::Eof);
    }

    #[test]
    fn negative_length_rejected() {
        let mut w = BinaryWriter::new();
        w.write_i32(-4).unwrap();
        let mut r = BinaryReader::new(w.finish());
        assert!(matches!(
            r.read_binary().unwrap_err(),
            ProtocolError::InvalidSize(-4)
        ));
    }

    #[test]
    fn skips_unknown_container_field() {
        let mut w = BinaryWriter::new();
        w.write_struct_begin().unwrap();
        w.write_field_begin(TType::List, 9).unwrap();
        w.write_list_begin(TType::String, 2).unwrap();
        w.write_string("a").unwrap();
        w.write_string("b").unwrap();
        w.write_list_end().unwrap();
        w.write_field_end().unwrap();
        w.write_field_begin(TType::I64, 2).unwrap();
        w.write_i64(7).unwrap();
        w.write_field_end().unwrap();
        w.write_stop().unwrap();
        w.write_struct_end().unwrap();

        let mut r = BinaryReader::new(w.finish());
        r.read_struct_begin().unwrap();
        let (ttype, id) = r.read_field_begin().unwrap().unwrap();
        assert_eq!((ttype, id), (TType::List, 9));
        skip(&mut r, ttype).unwrap();
        r.read_field_end().unwrap();
        let (ttype, id) = r.read_field_begin().unwrap().unwrap();
        assert_eq!((ttype, id), (TType::I64, 2));
        assert_eq!(r.read_i64().unwrap(), 7);
        assert!(r.read_field_begin().unwrap().is_none());
    }
}
