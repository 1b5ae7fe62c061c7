//! Error types for table access, RPC execution and XML handling.
//!
//! Table reads fail with [`TableError`]. Remote calls fail with [`RpcError`],
//! which [`crate::table::Table::fetch`] hands back to the caller unchanged.

use thiserror::Error;

/// Errors raised while reading or configuring a table.
#[derive(Error, Debug)]
pub enum TableError {
    /// A record-read operation ran before any document was loaded.
    ///
    /// Call `fetch` (or construct the table with a document) first.
    #[error("no data")]
    NoData,

    /// A view configuration that cannot produce a view.
    ///
    /// Raised when a catalog names a view that is not registered, or when a
    /// declarative view carries a field expression that does not compile.
    #[error("invalid view: {0}")]
    InvalidView(String),

    /// A record or name-field selector failed to compile.
    #[error(transparent)]
    InvalidXPath(#[from] XPathError),

    /// The catalog has no table with this name.
    #[error("table not found: {0}")]
    UnknownTable(String),

    /// The catalog document could not be decoded.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// XML handling failed while building a document.
    #[error(transparent)]
    Xml(#[from] XmlError),
}

/// Errors produced by a session's RPC facade.
#[derive(Error, Debug)]
pub enum RpcError {
    /// The transport could not deliver the request or read the reply.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with an `rpc-error`.
    #[error("rpc {rpc} failed: {message}")]
    Rpc { rpc: String, message: String },

    /// A replayer had no recorded exchange matching the request.
    #[error("replay mismatch: {0}")]
    ReplayMismatch(String),

    /// The reply was not well-formed XML.
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors from parsing or writing XML.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("malformed xml: {0}")]
    Malformed(String),

    #[error("document has no root element")]
    Empty,

    #[error("unexpected closing tag </{0}>")]
    UnexpectedClose(String),

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("xml write error: {0}")]
    Write(String),
}

/// A selector expression that could not be compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid xpath '{expr}': {reason}")]
pub struct XPathError {
    pub expr: String,
    pub reason: String,
}

impl XPathError {
    pub(crate) fn new(expr: &str, reason: impl Into<String>) -> Self {
        Self {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}
