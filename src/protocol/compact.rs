//! Thrift compact protocol.
//!
//! Zigzag varints for integers, field-id deltas packed into the field
//! header, booleans folded into the field type nibble, little-endian
//! doubles. Substantially smaller than the binary encoding for typical
//! RPC payloads, which is why it is the default content type.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{ProtocolError, ProtocolReader, ProtocolWriter, TType};

// Compact type nibbles. Booleans have two codes: the field header itself
// carries the value.
const STOP: u8 = 0x00;
const BOOL_TRUE: u8 = 0x01;
const BOOL_FALSE: u8 = 0x02;
const I8: u8 = 0x03;
const I16: u8 = 0x04;
const I32: u8 = 0x05;
const I64: u8 = 0x06;
const DOUBLE: u8 = 0x07;
const BINARY: u8 = 0x08;
const LIST: u8 = 0x09;
const SET: u8 = 0x0A;
const MAP: u8 = 0x0B;
const STRUCT: u8 = 0x0C;

const MAX_CLAIMED_LEN: u64 = 64 * 1024 * 1024;

fn type_nibble(ttype: TType) -> u8 {
    match ttype {
        TType::Stop => STOP,
        // Collection elements use the TRUE code; values are full bytes.
        TType::Bool => BOOL_TRUE,
        TType::I8 => I8,
        TType::I16 => I16,
        TType::I32 => I32,
        TType::I64 => I64,
        TType::Double => DOUBLE,
        TType::String => BINARY,
        TType::Struct => STRUCT,
        TType::Map => MAP,
        TType::Set => SET,
        TType::List => LIST,
    }
}

fn ttype_from_nibble(nibble: u8) -> Result<TType, ProtocolError> {
    match nibble {
        STOP => Ok(TType::Stop),
        BOOL_TRUE | BOOL_FALSE => Ok(TType::Bool),
        I8 => Ok(TType::I8),
        I16 => Ok(TType::I16),
        I32 => Ok(TType::I32),
        I64 => Ok(TType::I64),
        DOUBLE => Ok(TType::Double),
        BINARY => Ok(TType::String),
        STRUCT => Ok(TType::Struct),
        MAP => Ok(TType::Map),
        SET => Ok(TType::Set),
        LIST => Ok(TType::List),
        other => Err(ProtocolError::UnknownType(other)),
    }
}

fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn put_varint(buf: &mut BytesMut, mut v: u64) {
    loop {
        if v < 0x80 {
            buf.put_u8(v as u8);
            return;
        }
        buf.put_u8((v as u8 & 0x7F) | 0x80);
        v >>= 7;
    }
}

/// Compact protocol encoder.
#[derive(Default)]
pub struct CompactWriter {
    buf: BytesMut,
    last_field_id: i16,
    field_id_stack: Vec<i16>,
    pending_bool_field: Option<i16>,
}

impl CompactWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    fn write_field_header(&mut self, nibble: u8, id: i16) {
        let delta = id as i32 - self.last_field_id as i32;
        if (1..=15).contains(&delta) {
            self.buf.put_u8(((delta as u8) << 4) | nibble);
        } else {
            self.buf.put_u8(nibble);
            put_varint(&mut self.buf, zigzag_encode(id as i64));
        }
        self.last_field_id = id;
    }

    fn write_varint_len(&mut self, len: usize) -> Result<(), ProtocolError> {
        if len as u64 > MAX_CLAIMED_LEN {
            return Err(ProtocolError::InvalidSize(len as i64));
        }
        put_varint(&mut self.buf, len as u64);
        Ok(())
    }
}

impl ProtocolWriter for CompactWriter {
    fn write_struct_begin(&mut self) -> Result<(), ProtocolError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.last_field_id = self.field_id_stack.pop().unwrap_or(0);
        Ok(())
    }

    fn write_field_begin(&mut self, ttype: TType, id: i16) -> Result<(), ProtocolError> {
        if ttype == TType::Bool {
            // Header byte is deferred until the value is known.
            self.pending_bool_field = Some(id);
        } else {
            self.write_field_header(type_nibble(ttype), id);
        }
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
        let nibble = if v { BOOL_TRUE } else { BOOL_FALSE };
        match self.pending_bool_field.take() {
            Some(id) => self.write_field_header(nibble, id),
            None => self.buf.put_u8(nibble),
        }
        Ok(())
    }

    fn write_i8(&mut self, v: i8) -> Result<(), ProtocolError> {
        self.buf.put_i8(v);
        Ok(())
    }

    fn write_i16(&mut self, v: i16) -> Result<(), ProtocolError> {
        put_varint(&mut self.buf, zigzag_encode(v as i64));
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<(), ProtocolError> {
        put_varint(&mut self.buf, zigzag_encode(v as i64));
        Ok(())
    }

    fn write_i64(&mut self, v: i64) -> Result<(), ProtocolError> {
        put_varint(&mut self.buf, zigzag_encode(v));
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<(), ProtocolError> {
        self.buf.put_f64_le(v);
        Ok(())
    }

    fn write_string(&mut self, v: &str) -> Result<(), ProtocolError> {
        self.write_binary(v.as_bytes())
    }

    fn write_binary(&mut self, v: &[u8]) -> Result<(), ProtocolError> {
        self.write_varint_len(v.len())?;
        self.buf.put_slice(v);
        Ok(())
    }

    fn write_list_begin(&mut self, elem: TType, len: usize) -> Result<(), ProtocolError> {
        let nibble = type_nibble(elem);
        if len < 15 {
            self.buf.put_u8(((len as u8) << 4) | nibble);
        } else {
            self.buf.put_u8(0xF0 | nibble);
            self.write_varint_len(len)?;
        }
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
        if len == 0 {
            self.buf.put_u8(0);
            return Ok(());
        }
        self.write_varint_len(len)?;
        self.buf
            .put_u8((type_nibble(key) << 4) | type_nibble(value));
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn into_bytes(self: Box<Self>) -> Result<Bytes, ProtocolError> {
        Ok(self.buf.freeze())
    }
}

/// Compact protocol decoder over an in-memory body.
pub struct CompactReader {
    buf: Bytes,
    last_field_id: i16,
    field_id_stack: Vec<i16>,
    pending_bool: Option<bool>,
}

impl CompactReader {
    pub fn new(buf: Bytes) -> Self {
        Self {
            buf,
            last_field_id: 0,
            field_id_stack: Vec::new(),
            pending_bool: None,
        }
    }

    fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        if !self.buf.has_remaining() {
            return Err(ProtocolError::Eof);
        }
        Ok(self.buf.get_u8())
    }

    fn get_varint(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.get_u8()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::Malformed("varint too long".into()))
    }

    fn get_len(&mut self) -> Result<usize, ProtocolError> {
        let len = self.get_varint()?;
        if len > MAX_CLAIMED_LEN {
            return Err(ProtocolError::InvalidSize(len as i64));
        }
        Ok(len as usize)
    }

    fn take(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        if self.buf.remaining() < n {
            return Err(ProtocolError::Eof);
        }
        Ok(self.buf.split_to(n))
    }
}

impl ProtocolReader for CompactReader {
    fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.last_field_id = self.field_id_stack.pop().unwrap_or(0);
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<Option<(TType, i16)>, ProtocolError> {
        let byte = self.get_u8()?;
        if byte == STOP {
            return Ok(None);
        }
        let nibble = byte & 0x0F;
        let delta = byte >> 4;
        let id = if delta == 0 {
            let raw = zigzag_decode(self.get_varint()?);
            i16::try_from(raw).map_err(|_| ProtocolError::InvalidSize(raw))?
        } else {
            self.last_field_id.wrapping_add(delta as i16)
        };
        self.last_field_id = id;
        if nibble == BOOL_TRUE || nibble == BOOL_FALSE {
            self.pending_bool = Some(nibble == BOOL_TRUE);
        }
        Ok(Some((ttype_from_nibble(nibble)?, id)))
    }

    fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        if let Some(v) = self.pending_bool.take() {
            return Ok(v);
        }
        match self.get_u8()? {
            BOOL_TRUE => Ok(true),
            // Some writers emit 0x00 for false inside collections.
            BOOL_FALSE | 0x00 => Ok(false),
            other => Err(ProtocolError::Malformed(format!(
                "invalid bool byte {other:#04x}"
            ))),
        }
    }

    fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.get_u8()? as i8)
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let raw = zigzag_decode(self.get_varint()?);
        i16::try_from(raw).map_err(|_| ProtocolError::InvalidSize(raw))
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let raw = zigzag_decode(self.get_varint()?);
        i32::try_from(raw).map_err(|_| ProtocolError::InvalidSize(raw))
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(zigzag_decode(self.get_varint()?))
    }

    fn read_double(&mut self) -> Result<f64, ProtocolError> {
        if self.buf.remaining() < 8 {
            return Err(ProtocolError::Eof);
        }
        Ok(self.buf.get_f64_le())
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let raw = self.read_binary()?;
        String::from_utf8(raw).map_err(|_| ProtocolError::Utf8)
    }

    fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.get_len()?;
        Ok(self.take(len)?.to_vec())
    }

    fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        let byte = self.get_u8()?;
        let elem = ttype_from_nibble(byte & 0x0F)?;
        let len = if byte >> 4 == 0x0F {
            self.get_len()?
        } else {
            (byte >> 4) as usize
        };
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
        let len = self.get_len()?;
        if len == 0 {
            return Ok((TType::Stop, TType::Stop, 0));
        }
        let kv = self.get_u8()?;
        Ok((ttype_from_nibble(kv >> 4)?, ttype_from_nibble(kv & 0x0F)?, len))
    }

    fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}
