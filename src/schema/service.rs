//! Service descriptors and per-RPC type bindings.
//!
//! A descriptor names a service and enumerates its RPCs; one [`Rpc`]
//! implementation per procedure binds the generated args and result types
//! together. Descriptors are built by generated code at startup and never
//! mutated, so they can be shared freely across workers.

use super::{Reply, ThriftStruct, ThriftValue};

/// Identifies a logical RPC service.
///
/// The name is the dotted-lowercase form of the schema-qualified service
/// name (e.g. `my_services.thing.thing_service`) and doubles as the URL
/// prefix for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: &'static str,
    rpcs: &'static [&'static str],
}

impl ServiceDescriptor {
    pub const fn new(name: &'static str, rpcs: &'static [&'static str]) -> Self {
        Self { name, rpcs }
    }

    /// The dotted-lowercase canonical service name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared RPC names, in schema order.
    pub fn rpcs(&self) -> &'static [&'static str] {
        self.rpcs
    }

    pub fn contains(&self, rpc: &str) -> bool {
        self.rpcs.iter().any(|r| *r == rpc)
    }
}

/// One declared procedure: the compile-time binding between an RPC name,
/// its args struct and its result struct.
pub trait Rpc: Send + Sync + 'static {
    const NAME: &'static str;

    /// Generated `<rpc>_args` wrapper; its fields are the positional
    /// parameters in schema field-id order.
    type Args: ThriftStruct + ThriftValue + Clone;

    /// The success value type; `()` for void RPCs.
    type Ret: ThriftValue + Clone;

    /// Generated `<rpc>_result` wrapper.
    type Result: ResultStruct;
}

/// Generated `<rpc>_result` wrapper: at most one field set, `success`
/// plus one field per declared exception. This trait is the precomputed
/// value-type → result-field mapping; no runtime reflection is involved.
pub trait ResultStruct: ThriftStruct {
    /// True when the RPC returns void (no `success` field declared).
    const VOID: bool;

    /// Routes a reply into the matching field. Returns `None` when no
    /// declared field accepts the value's type — the caller reports that
    /// as a bad response.
    fn from_reply(reply: &Reply) -> Option<Self>;

    /// Projects the first set field back out, scanning in declared field
    /// order. Returns `None` when nothing is set on a non-void result.
    fn into_reply(self) -> Option<Reply>;
}
