//! Thrift JSON protocol.
//!
//! Structs become objects keyed by field id, each value wrapped in a
//! one-entry object naming its type: `{"1":{"i32":5}}`. Lists carry the
//! element type and count inline: `["i32",2,10,20]`; maps add a key type
//! and hold entries in an object with stringified keys. Binary fields are
//! base64, non-finite doubles are the strings `"NaN"`, `"Infinity"` and
//! `"-Infinity"`.
//!
//! The document is materialised through `serde_json::Value`; bodies are
//! small request/response envelopes, not streams.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use serde_json::{Map, Number, Value};

use super::{ProtocolError, ProtocolReader, ProtocolWriter, TType};

fn type_name(ttype: TType) -> &'static str {
    match ttype {
        TType::Stop => "stop",
        TType::Bool => "tf",
        TType::I8 => "i8",
        TType::I16 => "i16",
        TType::I32 => "i32",
        TType::I64 => "i64",
        TType::Double => "dbl",
        TType::String => "str",
        TType::Struct => "rec",
        TType::Map => "map",
        TType::Set => "set",
        TType::List => "lst",
    }
}

fn ttype_from_name(name: &str) -> Result<TType, ProtocolError> {
    match name {
        "tf" => Ok(TType::Bool),
        "i8" => Ok(TType::I8),
        "i16" => Ok(TType::I16),
        "i32" => Ok(TType::I32),
        "i64" => Ok(TType::I64),
        "dbl" => Ok(TType::Double),
        "str" => Ok(TType::String),
        "rec" => Ok(TType::Struct),
        "map" => Ok(TType::Map),
        "set" => Ok(TType::Set),
        "lst" => Ok(TType::List),
        other => Err(ProtocolError::Malformed(format!(
            "unknown type name {other:?}"
        ))),
    }
}

enum WriteFrame {
    Struct {
        map: Map<String, Value>,
        field: Option<(String, &'static str)>,
    },
    Seq {
        elem: &'static str,
        len: usize,
        items: Vec<Value>,
    },
    Map {
        key: &'static str,
        value: &'static str,
        len: usize,
        entries: Map<String, Value>,
        pending_key: Option<String>,
        on_key: bool,
    },
}

/// JSON protocol encoder.
#[derive(Default)]
pub struct JsonWriter {
    stack: Vec<WriteFrame>,
    root: Option<Value>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Result<Bytes, ProtocolError> {
        let root = self.root.unwrap_or(Value::Object(Map::new()));
        let raw = serde_json::to_vec(&root)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(Bytes::from(raw))
    }

    fn emit(&mut self, value: Value) -> Result<(), ProtocolError> {
        match self.stack.last_mut() {
            None => {
                self.root = Some(value);
                Ok(())
            }
            Some(WriteFrame::Struct { map, field }) => {
                let (id, ty) = field.take().ok_or_else(|| {
                    ProtocolError::Malformed("value written outside a field".into())
                })?;
                let mut wrapper = Map::with_capacity(1);
                wrapper.insert(ty.to_string(), value);
                map.insert(id, Value::Object(wrapper));
                Ok(())
            }
            Some(WriteFrame::Seq { items, .. }) => {
                items.push(value);
                Ok(())
            }
            Some(WriteFrame::Map {
                entries,
                pending_key,
                on_key,
                ..
            }) => {
                if *on_key {
                    *pending_key = Some(map_key(&value));
                    *on_key = false;
                } else {
                    let key = pending_key.take().ok_or_else(|| {
                        ProtocolError::Malformed("map value without a key".into())
                    })?;
                    entries.insert(key, value);
                    *on_key = true;
                }
                Ok(())
            }
        }
    }
}

/// Map keys are JSON object keys, so every key type is stringified.
fn map_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn double_value(v: f64) -> Value {
    if v.is_nan() {
        Value::String("NaN".into())
    } else if v.is_infinite() {
        Value::String(if v > 0.0 { "Infinity" } else { "-Infinity" }.into())
    } else {
        Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl ProtocolWriter for JsonWriter {
    fn write_struct_begin(&mut self) -> Result<(), ProtocolError> {
        self.stack.push(WriteFrame::Struct {
            map: Map::new(),
            field: None,
        });
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        match self.stack.pop() {
            Some(WriteFrame::Struct { map, .. }) => self.emit(Value::Object(map)),
            _ => Err(ProtocolError::Malformed("unbalanced struct end".into())),
        }
    }

    fn write_field_begin(&mut self, ttype: TType, id: i16) -> Result<(), ProtocolError> {
        match self.stack.last_mut() {
            Some(WriteFrame::Struct { field, .. }) => {
                *field = Some((id.to_string(), type_name(ttype)));
                Ok(())
            }
            _ => Err(ProtocolError::Malformed("field outside a struct".into())),
        }
    }

    fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_stop(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<(), ProtocolError> {
        self.emit(Value::Number(Number::from(v as i64)))
    }

    fn write_i8(&mut self, v: i8) -> Result<(), ProtocolError> {
        self.emit(Value::Number(Number::from(v)))
    }

    fn write_i16(&mut self, v: i16) -> Result<(), ProtocolError> {
        self.emit(Value::Number(Number::from(v)))
    }

    fn write_i32(&mut self, v: i32) -> Result<(), ProtocolError> {
        self.emit(Value::Number(Number::from(v)))
    }

    fn write_i64(&mut self, v: i64) -> Result<(), ProtocolError> {
        self.emit(Value::Number(Number::from(v)))
    }

    fn write_double(&mut self, v: f64) -> Result<(), ProtocolError> {
        self.emit(double_value(v))
    }

    fn write_string(&mut self, v: &str) -> Result<(), ProtocolError> {
        self.emit(Value::String(v.to_string()))
    }

    fn write_binary(&mut self, v: &[u8]) -> Result<(), ProtocolError> {
        self.emit(Value::String(STANDARD_NO_PAD.encode(v)))
    }

    fn write_list_begin(&mut self, elem: TType, len: usize) -> Result<(), ProtocolError> {
        self.stack.push(WriteFrame::Seq {
            elem: type_name(elem),
            len,
            items: Vec::with_capacity(len),
        });
        Ok(())
    }

    fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        match self.stack.pop() {
            Some(WriteFrame::Seq { elem, len, items }) => {
                let mut arr = Vec::with_capacity(items.len() + 2);
                arr.push(Value::String(elem.to_string()));
                arr.push(Value::Number(Number::from(len)));
                arr.extend(items);
                self.emit(Value::Array(arr))
            }
            _ => Err(ProtocolError::Malformed("unbalanced list end".into())),
        }
    }

    fn write_set_begin(&mut self, elem: TType, len: usize) -> Result<(), ProtocolError> {
        self.write_list_begin(elem, len)
    }

    fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        self.write_list_end()
    }

    fn write_map_begin(
        &mut self,
        key: TType,
        value: TType,
        len: usize,
    ) -> Result<(), ProtocolError> {
        self.stack.push(WriteFrame::Map {
            key: type_name(key),
            value: type_name(value),
            len,
            entries: Map::new(),
            pending_key: None,
            on_key: true,
        });
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        match self.stack.pop() {
            Some(WriteFrame::Map {
                key,
                value,
                len,
                entries,
                ..
            }) => self.emit(Value::Array(vec![
                Value::String(key.to_string()),
                Value::String(value.to_string()),
                Value::Number(Number::from(len)),
                Value::Object(entries),
            ])),
            _ => Err(ProtocolError::Malformed("unbalanced map end".into())),
        }
    }

    fn into_bytes(self: Box<Self>) -> Result<Bytes, ProtocolError> {
        (*self).finish()
    }
}

#[derive(Debug)]
enum ReadFrame {
    Struct {
        fields: std::vec::IntoIter<(String, Value)>,
    },
    Seq {
        items: std::vec::IntoIter<Value>,
    },
    Map {
        entries: std::vec::IntoIter<(String, Value)>,
        pending_value: Option<Value>,
    },
}

/// JSON protocol decoder over an in-memory body.
#[derive(Debug)]
pub struct JsonReader {
    pending: Option<Value>,
    stack: Vec<ReadFrame>,
}

impl JsonReader {
    pub fn new(body: &[u8]) -> Result<Self, ProtocolError> {
        let root: Value = serde_json::from_slice(body)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(Self {
            pending: Some(root),
            stack: Vec::new(),
        })
    }

    fn next_value(&mut self) -> Result<Value, ProtocolError> {
        if let Some(v) = self.pending.take() {
            return Ok(v);
        }
        match self.stack.last_mut() {
            Some(ReadFrame::Seq { items }) => items.next().ok_or(ProtocolError::Eof),
            Some(ReadFrame::Map {
                entries,
                pending_value,
            }) => {
                if let Some(v) = pending_value.take() {
                    return Ok(v);
                }
                let (key, value) = entries.next().ok_or(ProtocolError::Eof)?;
                *pending_value = Some(value);
                Ok(Value::String(key))
            }
            _ => Err(ProtocolError::Eof),
        }
    }

    fn next_i64(&mut self) -> Result<i64, ProtocolError> {
        match self.next_value()? {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| ProtocolError::Malformed(format!("non-integer number {n}"))),
            // Map keys arrive as strings.
            Value::String(s) => s
                .parse()
                .map_err(|_| ProtocolError::Malformed(format!("non-integer key {s:?}"))),
            other => Err(ProtocolError::Malformed(format!(
                "expected integer, found {other}"
            ))),
        }
    }
}

impl ProtocolReader for JsonReader {
    fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        match self.next_value()? {
            Value::Object(map) => {
                let fields: Vec<(String, Value)> = map.into_iter().collect();
                self.stack.push(ReadFrame::Struct {
                    fields: fields.into_iter(),
                });
                Ok(())
            }
            other => Err(ProtocolError::Malformed(format!(
                "expected object, found {other}"
            ))),
        }
    }

    fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        match self.stack.pop() {
            Some(ReadFrame::Struct { .. }) => Ok(()),
            _ => Err(ProtocolError::Malformed("unbalanced struct end".into())),
        }
    }

    fn read_field_begin(&mut self) -> Result<Option<(TType, i16)>, ProtocolError> {
        let entry = match self.stack.last_mut() {
            Some(ReadFrame::Struct { fields }) => fields.next(),
            _ => return Err(ProtocolError::Malformed("field outside a struct".into())),
        };
        let Some((key, wrapped)) = entry else {
            return Ok(None);
        };
        let id: i16 = key
            .parse()
            .map_err(|_| ProtocolError::Malformed(format!("non-numeric field id {key:?}")))?;
        let Value::Object(wrapper) = wrapped else {
            return Err(ProtocolError::Malformed(format!(
                "field {id} is not a typed wrapper"
            )));
        };
        if wrapper.len() != 1 {
            return Err(ProtocolError::Malformed(format!(
                "field {id} wrapper has {} entries",
                wrapper.len()
            )));
        }
        let (name, inner) = wrapper.into_iter().next().ok_or(ProtocolError::Eof)?;
        self.pending = Some(inner);
        Ok(Some((ttype_from_name(&name)?, id)))
    }

    fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.next_i64()? != 0)
    }

    fn read_i8(&mut self) -> Result<i8, ProtocolError> {
        let raw = self.next_i64()?;
        i8::try_from(raw).map_err(|_| ProtocolError::InvalidSize(raw))
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let raw = self.next_i64()?;
        i16::try_from(raw).map_err(|_| ProtocolError::InvalidSize(raw))
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let raw = self.next_i64()?;
        i32::try_from(raw).map_err(|_| ProtocolError::InvalidSize(raw))
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.next_i64()
    }

    fn read_double(&mut self) -> Result<f64, ProtocolError> {
        match self.next_value()? {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| ProtocolError::Malformed(format!("bad double {n}"))),
            Value::String(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => other
                    .parse()
                    .map_err(|_| ProtocolError::Malformed(format!("bad double {other:?}"))),
            },
            other => Err(ProtocolError::Malformed(format!(
                "expected double, found {other}"
            ))),
        }
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        match self.next_value()? {
            Value::String(s) => Ok(s),
            other => Err(ProtocolError::Malformed(format!(
                "expected string, found {other}"
            ))),
        }
    }

    fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let encoded = self.read_string()?;
        STANDARD_NO_PAD
            .decode(&encoded)
            .or_else(|_| STANDARD.decode(&encoded))
            .map_err(|_| ProtocolError::Base64)
    }

    fn read_list_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        match self.next_value()? {
            Value::Array(arr) => {
                let mut items = arr.into_iter();
                let elem = match items.next() {
                    Some(Value::String(name)) => ttype_from_name(&name)?,
                    _ => return Err(ProtocolError::Malformed("list missing element type".into())),
                };
                let len = match items.next() {
                    Some(Value::Number(n)) if n.as_u64().is_some() => n.as_u64().unwrap() as usize,
                    _ => return Err(ProtocolError::Malformed("list missing length".into())),
                };
                let rest: Vec<Value> = items.collect();
                self.stack.push(ReadFrame::Seq {
                    items: rest.into_iter(),
                });
                Ok((elem, len))
            }
            other => Err(ProtocolError::Malformed(format!(
                "expected list array, found {other}"
            ))),
        }
    }

    fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        match self.stack.pop() {
            Some(ReadFrame::Seq { .. }) => Ok(()),
            _ => Err(ProtocolError::Malformed("unbalanced list end".into())),
        }
    }

    fn read_set_begin(&mut self) -> Result<(TType, usize), ProtocolError> {
        self.read_list_begin()
    }

    fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        self.read_list_end()
    }

    fn read_map_begin(&mut self) -> Result<(TType, TType, usize), ProtocolError> {
        match self.next_value()? {
            Value::Array(arr) => {
                let mut items = arr.into_iter();
                let key = match items.next() {
                    Some(Value::String(name)) => ttype_from_name(&name)?,
                    _ => return Err(ProtocolError::Malformed("map missing key type".into())),
                };
                let value = match items.next() {
                    Some(Value::String(name)) => ttype_from_name(&name)?,
                    _ => return Err(ProtocolError::Malformed("map missing value type".into())),
                };
                let len = match items.next() {
                    Some(Value::Number(n)) if n.as_u64().is_some() => n.as_u64().unwrap() as usize,
                    _ => return Err(ProtocolError::Malformed("map missing length".into())),
                };
                let entries = match items.next() {
                    Some(Value::Object(map)) => map,
                    None if len == 0 => Map::new(),
                    _ => return Err(ProtocolError::Malformed("map missing entries".into())),
                };
                let entries: Vec<(String, Value)> = entries.into_iter().collect();
                self.stack.push(ReadFrame::Map {
                    entries: entries.into_iter(),
                    pending_value: None,
                });
                Ok((key, value, len))
            }
            other => Err(ProtocolError::Malformed(format!(
                "expected map array, found {other}"
            ))),
        }
    }

    fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        match self.stack.pop() {
            Some(ReadFrame::Map { .. }) => Ok(()),
            _ => Err(ProtocolError::Malformed("unbalanced map end".into())),
        }
    }
}
