//! Shared fixtures: the calculator test service in the shape the schema
//! compiler would emit it, plus server spawn helpers and an
//! event-collecting subscriber.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thtp::envelope;
use thtp::errors::ClientError;
use thtp::events::{InternalError, RpcError, RpcException, RpcSuccess, Subscriber};
use thtp::impl_thrift_value;
use thtp::protocol::{skip, ProtocolError, ProtocolReader, ProtocolWriter, TType};
use thtp::schema::{Reply, ResultStruct, Rpc, ServiceDescriptor, ThriftStruct, ValidationError};
use thtp::server::HandlerError;
use thtp::{ClientConfig, Protocol, ThtpClient, ThtpServer};

pub const CALCULATOR: ServiceDescriptor = ServiceDescriptor::new(
    "thtp.test.calculator_service",
    &["do_operation", "set_variables", "test_internal_error"],
);

// ---------------------------------------------------------------------
// Generated-style schema types
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Operation {
    Add = 1,
    Subtract = 2,
    Multiply = 3,
    Divide = 4,
}

impl Operation {
    fn from_i32(v: i32) -> Result<Operation, ProtocolError> {
        match v {
            1 => Ok(Operation::Add),
            2 => Ok(Operation::Subtract),
            3 => Ok(Operation::Multiply),
            4 => Ok(Operation::Divide),
            other => Err(ProtocolError::Malformed(format!(
                "unknown Operation value {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoOperationArgs {
    pub op: Operation,
    pub operand_one: i32,
    pub operand_two: i32,
}

impl ThriftStruct for DoOperationArgs {
    const NAME: &'static str = "do_operation_args";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_field_begin(TType::I32, 1)?;
        out.write_i32(self.op as i32)?;
        out.write_field_end()?;
        out.write_field_begin(TType::I32, 2)?;
        out.write_i32(self.operand_one)?;
        out.write_field_end()?;
        out.write_field_begin(TType::I32, 3)?;
        out.write_i32(self.operand_two)?;
        out.write_field_end()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut op = None;
        let mut operand_one = 0;
        let mut operand_two = 0;
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (1, TType::I32) => op = Some(Operation::from_i32(input.read_i32()?)?),
                (2, TType::I32) => operand_one = input.read_i32()?,
                (3, TType::I32) => operand_two = input.read_i32()?,
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(Self {
            op: op.ok_or_else(|| ProtocolError::Malformed("op is required".into()))?,
            operand_one,
            operand_two,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DivideByZero {
    pub error_string: String,
    pub zero: i32,
}

impl ThriftStruct for DivideByZero {
    const NAME: &'static str = "DivideByZero";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_field_begin(TType::String, 1)?;
        out.write_string(&self.error_string)?;
        out.write_field_end()?;
        out.write_field_begin(TType::I32, 2)?;
        out.write_i32(self.zero)?;
        out.write_field_end()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut result = Self::default();
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (1, TType::String) => result.error_string = input.read_string()?,
                (2, TType::I32) => result.zero = input.read_i32()?,
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DoOperationResult {
    pub success: Option<i32>,
    pub dvz_exception: Option<DivideByZero>,
}

impl ThriftStruct for DoOperationResult {
    const NAME: &'static str = "do_operation_result";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        if let Some(v) = self.success {
            out.write_field_begin(TType::I32, 0)?;
            out.write_i32(v)?;
            out.write_field_end()?;
        }
        if let Some(e) = &self.dvz_exception {
            out.write_field_begin(TType::Struct, 1)?;
            e.write(out)?;
            out.write_field_end()?;
        }
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut result = Self::default();
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (0, TType::I32) => result.success = Some(input.read_i32()?),
                (1, TType::Struct) => result.dvz_exception = Some(DivideByZero::read(input)?),
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(result)
    }
}

impl ResultStruct for DoOperationResult {
    const VOID: bool = false;

    fn from_reply(reply: &Reply) -> Option<Self> {
        match reply {
            Reply::Void => Some(Self::default()),
            Reply::Value(v) => v.as_any().downcast_ref::<i32>().map(|v| Self {
                success: Some(*v),
                ..Default::default()
            }),
            Reply::Exception(e) => e.as_any().downcast_ref::<DivideByZero>().map(|e| Self {
                dvz_exception: Some(e.clone()),
                ..Default::default()
            }),
        }
    }

    fn into_reply(self) -> Option<Reply> {
        if let Some(v) = self.success {
            return Some(Reply::value(v));
        }
        if let Some(e) = self.dvz_exception {
            return Some(Reply::exception(e));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetVal {
    pub message: String,
    pub code: i32,
}

impl ThriftStruct for RetVal {
    const NAME: &'static str = "RetVal";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_field_begin(TType::String, 1)?;
        out.write_string(&self.message)?;
        out.write_field_end()?;
        out.write_field_begin(TType::I32, 2)?;
        out.write_i32(self.code)?;
        out.write_field_end()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut result = Self::default();
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (1, TType::String) => result.message = input.read_string()?,
                (2, TType::I32) => result.code = input.read_i32()?,
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OhNo {
    pub screams: i32,
}

impl ThriftStruct for OhNo {
    const NAME: &'static str = "OhNo";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_field_begin(TType::I32, 1)?;
        out.write_i32(self.screams)?;
        out.write_field_end()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut result = Self::default();
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (1, TType::I32) => result.screams = input.read_i32()?,
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetVariablesArgs {
    pub reason: String,
    pub req: RetVal,
}

impl ThriftStruct for SetVariablesArgs {
    const NAME: &'static str = "set_variables_args";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_field_begin(TType::String, 1)?;
        out.write_string(&self.reason)?;
        out.write_field_end()?;
        out.write_field_begin(TType::Struct, 2)?;
        self.req.write(out)?;
        out.write_field_end()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut result = Self::default();
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (1, TType::String) => result.reason = input.read_string()?,
                (2, TType::Struct) => result.req = RetVal::read(input)?,
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(result)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.reason.is_empty() {
            return Err(ValidationError("reason must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetVariablesResult {
    pub success: Option<RetVal>,
    pub oh_no: Option<OhNo>,
}

impl ThriftStruct for SetVariablesResult {
    const NAME: &'static str = "set_variables_result";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        if let Some(v) = &self.success {
            out.write_field_begin(TType::Struct, 0)?;
            v.write(out)?;
            out.write_field_end()?;
        }
        if let Some(e) = &self.oh_no {
            out.write_field_begin(TType::Struct, 1)?;
            e.write(out)?;
            out.write_field_end()?;
        }
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        let mut result = Self::default();
        input.read_struct_begin()?;
        while let Some((ttype, id)) = input.read_field_begin()? {
            match (id, ttype) {
                (0, TType::Struct) => result.success = Some(RetVal::read(input)?),
                (1, TType::Struct) => result.oh_no = Some(OhNo::read(input)?),
                _ => skip(input, ttype)?,
            }
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(result)
    }
}

impl ResultStruct for SetVariablesResult {
    const VOID: bool = false;

    fn from_reply(reply: &Reply) -> Option<Self> {
        match reply {
            Reply::Void => Some(Self::default()),
            Reply::Value(v) => v.as_any().downcast_ref::<RetVal>().map(|v| Self {
                success: Some(v.clone()),
                ..Default::default()
            }),
            Reply::Exception(e) => e.as_any().downcast_ref::<OhNo>().map(|e| Self {
                oh_no: Some(e.clone()),
                ..Default::default()
            }),
        }
    }

    fn into_reply(self) -> Option<Reply> {
        if let Some(v) = self.success {
            return Some(Reply::value(v));
        }
        if let Some(e) = self.oh_no {
            return Some(Reply::exception(e));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestInternalErrorArgs;

impl ThriftStruct for TestInternalErrorArgs {
    const NAME: &'static str = "test_internal_error_args";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        input.read_struct_begin()?;
        while let Some((ttype, _)) = input.read_field_begin()? {
            skip(input, ttype)?;
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestInternalErrorResult;

impl ThriftStruct for TestInternalErrorResult {
    const NAME: &'static str = "test_internal_error_result";

    fn write(&self, out: &mut dyn ProtocolWriter) -> Result<(), ProtocolError> {
        out.write_struct_begin()?;
        out.write_stop()?;
        out.write_struct_end()
    }

    fn read(input: &mut dyn ProtocolReader) -> Result<Self, ProtocolError> {
        input.read_struct_begin()?;
        while let Some((ttype, _)) = input.read_field_begin()? {
            skip(input, ttype)?;
            input.read_field_end()?;
        }
        input.read_struct_end()?;
        Ok(Self)
    }
}

impl ResultStruct for TestInternalErrorResult {
    const VOID: bool = true;

    fn from_reply(reply: &Reply) -> Option<Self> {
        match reply {
            Reply::Void => Some(Self),
            _ => None,
        }
    }

    fn into_reply(self) -> Option<Reply> {
        Some(Reply::Void)
    }
}

impl_thrift_value!(
    DoOperationArgs,
    DivideByZero,
    DoOperationResult,
    RetVal,
    OhNo,
    SetVariablesArgs,
    SetVariablesResult,
    TestInternalErrorArgs,
    TestInternalErrorResult,
);

// ---------------------------------------------------------------------
// Generated-style RPC bindings
// ---------------------------------------------------------------------

pub struct DoOperation;

impl Rpc for DoOperation {
    const NAME: &'static str = "do_operation";
    type Args = DoOperationArgs;
    type Ret = i32;
    type Result = DoOperationResult;
}

pub struct SetVariables;

impl Rpc for SetVariables {
    const NAME: &'static str = "set_variables";
    type Args = SetVariablesArgs;
    type Ret = RetVal;
    type Result = SetVariablesResult;
}

pub struct TestInternalError;

impl Rpc for TestInternalError {
    const NAME: &'static str = "test_internal_error";
    type Args = TestInternalErrorArgs;
    type Ret = ();
    type Result = TestInternalErrorResult;
}

/// Generated-style client wrapper exposing positional parameters.
pub struct CalculatorClient {
    pub inner: ThtpClient,
}

impl CalculatorClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            inner: ThtpClient::new(CALCULATOR, config)?,
        })
    }

    pub async fn do_operation(
        &self,
        op: Operation,
        operand_one: i32,
        operand_two: i32,
    ) -> Result<i32, ClientError> {
        self.inner
            .call::<DoOperation>(DoOperationArgs {
                op,
                operand_one,
                operand_two,
            })
            .await
    }

    pub async fn set_variables(&self, reason: &str, req: RetVal) -> Result<RetVal, ClientError> {
        self.inner
            .call::<SetVariables>(SetVariablesArgs {
                reason: reason.to_string(),
                req,
            })
            .await
    }

    pub async fn test_internal_error(&self) -> Result<(), ClientError> {
        self.inner
            .call::<TestInternalError>(TestInternalErrorArgs)
            .await
    }
}

// ---------------------------------------------------------------------
// Handlers and server helpers
// ---------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
#[error("boom")]
pub struct Boom;

async fn do_operation_handler(args: DoOperationArgs) -> Result<i32, HandlerError> {
    match args.op {
        Operation::Add => Ok(args.operand_one + args.operand_two),
        Operation::Subtract => Ok(args.operand_one - args.operand_two),
        Operation::Multiply => Ok(args.operand_one * args.operand_two),
        Operation::Divide => {
            if args.operand_two == 0 {
                Err(HandlerError::exception(DivideByZero {
                    error_string: "nope".into(),
                    zero: 0,
                }))
            } else {
                Ok(args.operand_one / args.operand_two)
            }
        }
    }
}

/// The standard test server: computes, raises `DivideByZero` on division
/// by zero, and fails internally on `test_internal_error`.
pub fn calculator_builder() -> thtp::server::ServerBuilder {
    ThtpServer::builder(CALCULATOR)
        .handle::<DoOperation, _, _>(do_operation_handler)
        .handle::<SetVariables, _, _>(|args: SetVariablesArgs| async move {
            Ok(RetVal {
                message: args.reason,
                code: args.req.code + 1,
            })
        })
        .handle::<TestInternalError, _, _>(|_args| async move {
            Err::<(), _>(HandlerError::internal(Boom))
        })
}

/// Variant whose `do_operation` stalls before replying and whose
/// `test_internal_error` succeeds, for timeout and void-return tests.
pub fn slow_calculator_builder(delay: Duration) -> thtp::server::ServerBuilder {
    ThtpServer::builder(CALCULATOR)
        .handle::<DoOperation, _, _>(move |args: DoOperationArgs| async move {
            tokio::time::sleep(delay).await;
            Ok(args.operand_one + args.operand_two)
        })
        .handle::<TestInternalError, _, _>(|_args: TestInternalErrorArgs| async move { Ok(()) })
}

/// Binds an ephemeral port and serves the router in the background.
pub async fn spawn_server(server: ThtpServer) -> SocketAddr {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server.into_router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// One-time tracing setup so `RUST_LOG` works under `cargo test`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "thtp=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

pub fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ClientConfig::default()
    }
}

/// Encodes an args struct the way a caller would for a raw HTTP probe.
pub fn encode_args<A: ThriftStruct>(args: &A, protocol: Protocol) -> Vec<u8> {
    envelope::write_args(args, protocol).unwrap().to_vec()
}

// ---------------------------------------------------------------------
// Event collection
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Success { rpc: String, elapsed_ms: u128 },
    Exception { rpc: String, exception: &'static str },
    Error { rpc: Option<String>, error: String },
    Internal { rpc: Option<String>, error: String },
}

#[derive(Default)]
pub struct CollectingSubscriber {
    events: Mutex<Vec<Recorded>>,
}

impl CollectingSubscriber {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }
}

impl Subscriber for CollectingSubscriber {
    fn rpc_success(&self, event: &RpcSuccess) {
        self.events.lock().unwrap().push(Recorded::Success {
            rpc: event.rpc.clone(),
            elapsed_ms: event.elapsed.as_millis(),
        });
    }

    fn rpc_exception(&self, event: &RpcException) {
        self.events.lock().unwrap().push(Recorded::Exception {
            rpc: event.rpc.clone(),
            exception: event.exception.type_name(),
        });
    }

    fn rpc_error(&self, event: &RpcError) {
        self.events.lock().unwrap().push(Recorded::Error {
            rpc: event.rpc.clone(),
            error: event.error.to_string(),
        });
    }

    fn internal_error(&self, event: &InternalError) {
        self.events.lock().unwrap().push(Recorded::Internal {
            rpc: event.rpc.clone(),
            error: event.error.to_string(),
        });
    }
}
