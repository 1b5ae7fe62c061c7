//! Device sessions and the RPC facade.
//!
//! A [`Session`] is whatever can answer RPCs for one managed device. This
//! crate does not speak NETCONF itself: a transport implements [`Session`]
//! and tables drive it through the borrowed [`Rpc`] facade.
//!
//! # Main Components
//!
//! - [`Session`] - Device handle: display name plus RPC execution
//! - [`Rpc`] - Facade used by tables to invoke named operations
//! - [`StaticSession`] - Offline session serving canned replies
//! - [`RecordingSession`] / [`RpcRecorder`] - Capture exchanges as JSONL
//! - [`RpcReplayer`] - Offline session replaying a capture

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::RpcError;
use crate::rpc::{RpcArgs, RpcRequest};
use crate::xml::Document;

pub use fixture::StaticSession;
pub use recording::{
    ExchangeOutcome, NormalizeOptions, RecordLevel, RecordingSession, RpcExchange, RpcRecorder,
    RpcReplayer,
};

/// One connected managed device.
///
/// Implementations block for the full round trip. Timeouts, retries and
/// cancellation belong to the implementation, not to callers.
pub trait Session: Send + Sync {
    /// Display identifier, usually the device hostname.
    fn hostname(&self) -> &str;

    /// Executes one RPC and returns the parsed reply payload.
    fn execute(&self, request: &RpcRequest) -> Result<Document, RpcError>;
}

impl<S: Session + ?Sized> Session for Arc<S> {
    fn hostname(&self) -> &str {
        (**self).hostname()
    }

    fn execute(&self, request: &RpcRequest) -> Result<Document, RpcError> {
        (**self).execute(request)
    }
}

/// RPC facade over a session.
#[derive(Clone, Copy)]
pub struct Rpc<'a> {
    session: &'a dyn Session,
}

impl<'a> Rpc<'a> {
    pub fn new(session: &'a dyn Session) -> Self {
        Self { session }
    }

    /// Invokes `rpc` with `args`. Errors come back exactly as the session
    /// produced them.
    pub fn call(&self, rpc: &str, args: &RpcArgs) -> Result<Document, RpcError> {
        let request = RpcRequest::new(rpc, args.clone());
        debug!(
            "{} rpc {} ({} args)",
            self.session.hostname(),
            request.tag(),
            request.args.len()
        );
        self.session.execute(&request)
    }
}

mod fixture;
mod recording;
