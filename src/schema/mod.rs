//! Contract between this crate and compiler-generated schema code.
//!
//! # Data Flow
//! ```text
//! thrift compiler output (out of scope)
//!     → args / result structs implementing ThriftStruct + ThriftValue
//!     → service descriptors + Rpc bindings (service.rs)
//!     → consumed by the envelope codec, dispatch pipeline and client
//! ```
//!
//! Nothing here reflects over types at runtime; generated code supplies
//! the per-type glue once, at compile time.

pub mod service;

pub use service::{ResultStruct, Rpc, ServiceDescriptor};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::protocol::{skip, ProtocolError, ProtocolReader, ProtocolWriter, TType};

/// Error from a generated `validate()` hook.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("schema validation failed: {0}")]
pub struct ValidationError(pub String);

/// A type with a Thrift wire representation. Implemented by generated
/// structs (args, results, exceptions) and by `ApplicationException`.
pub trait ThriftStruct: Send + Sync + Sized + 'static {
    /// Unqualified schema name, used in diagnostics.
    const NAME: &'static str;

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError>;
    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError>;

    /// Schema-defined constraint check. Generated code overrides this;
    /// the default accepts everything.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Type-erased view of a value crossing the middleware chain or a
/// lifecycle event: args structs, success values, declared exceptions.
pub trait ThriftValue: Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn validate_value(&self) -> Result<(), ValidationError>;
    /// Short name for diagnostics and error messages.
    fn type_name(&self) -> &'static str;
}

/// Implements [`ThriftValue`] for a generated struct by delegating to its
/// [`ThriftStruct`] impl. Generated code invokes this once per type.
#[macro_export]
macro_rules! impl_thrift_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::schema::ThriftValue for $ty {
                fn as_any(&self) -> &dyn ::std::any::Any {
                    self
                }

                fn validate_value(&self) -> Result<(), $crate::schema::ValidationError> {
                    $crate::schema::ThriftStruct::validate(self)
                }

                fn type_name(&self) -> &'static str {
                    <$ty as $crate::schema::ThriftStruct>::NAME
                }
            }
        )+
    };
}

macro_rules! base_value_impls {
    ($($ty:ty => $name:literal),+ $(,)?) => {
        $(
            impl ThriftValue for $ty {
                fn as_any(&self) -> &dyn Any {
                    self
                }

                fn validate_value(&self) -> Result<(), ValidationError> {
                    Ok(())
                }

                fn type_name(&self) -> &'static str {
                    $name
                }
            }
        )+
    };
}

base_value_impls! {
    bool => "bool",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    f64 => "double",
    String => "string",
    () => "void",
}

impl<T: Send + Sync + 'static> ThriftValue for Vec<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn validate_value(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        "list"
    }
}

/// Outcome of one RPC as it flows through the middleware chain: the
/// success value, a schema-declared exception, or a void return.
///
/// At most one of these applies per call, mirroring the result struct's
/// at-most-one-field-set invariant.
#[derive(Clone)]
pub enum Reply {
    Value(Arc<dyn ThriftValue>),
    Exception(Arc<dyn ThriftValue>),
    Void,
}

impl Reply {
    pub fn value<T: ThriftValue>(v: T) -> Reply {
        Reply::Value(Arc::new(v))
    }

    pub fn exception<E: ThriftValue>(e: E) -> Reply {
        Reply::Exception(Arc::new(e))
    }

    /// The carried success value, if it has the expected type.
    pub fn downcast_value<T: Clone + 'static>(&self) -> Option<T> {
        match self {
            Reply::Value(v) => v.as_any().downcast_ref::<T>().cloned(),
            _ => None,
        }
    }

    /// Name of the carried value's type, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Reply::Value(v) => v.type_name(),
            Reply::Exception(e) => e.type_name(),
            Reply::Void => "void",
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Value(v) => write!(f, "Reply::Value({})", v.type_name()),
            Reply::Exception(e) => write!(f, "Reply::Exception({})", e.type_name()),
            Reply::Void => f.write_str("Reply::Void"),
        }
    }
}

/// Thrift application-exception type codes carried on status-500 bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExceptionType {
    Unknown = 0,
    UnknownMethod = 1,
    InvalidMessageType = 2,
    WrongMethodName = 3,
    MissingResult = 5,
    InternalError = 6,
    ProtocolError = 7,
}

impl ExceptionType {
    pub fn from_i32(v: i32) -> ExceptionType {
        match v {
            1 => ExceptionType::UnknownMethod,
            2 => ExceptionType::InvalidMessageType,
            3 => ExceptionType::WrongMethodName,
            5 => ExceptionType::MissingResult,
            6 => ExceptionType::InternalError,
            7 => ExceptionType::ProtocolError,
            _ => ExceptionType::Unknown,
        }
    }
}

/// The schemaless exception envelope: `struct { 1: string message,
/// 2: i32 type }`, sent with HTTP status 500.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (type {exception_type:?})")]
pub struct ApplicationException {
    pub message: String,
    pub exception_type: ExceptionType,
}

impl ApplicationException {
    pub fn new(exception_type: ExceptionType, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exception_type,
        }
    }
}

impl ThriftStruct for ApplicationException {
    const NAME: &'static str = "ApplicationException";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_field_begin(TType::String, 1)?;
        out.write_string(&self.message)?;
        out.write_field_end()?;
        out.write_field_begin(TType::I32, 2)?;
        out.write_i32(self.exception_type as i32)?;
        out.write_field_end()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut message = String::new();
        let mut exception_type = ExceptionType::Unknown;
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (1, TType::String) => message = input.read_string()?,
                (2, TType::I32) => exception_type = ExceptionType::from_i32(input.read_i32()?),
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(Self {
            message,
            exception_type,
        })
    }
}

impl_thrift_value!(ApplicationException);
