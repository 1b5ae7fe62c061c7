//! # rjunos - Table and view access to Junos device data
//!
//! `rjunos` models remote configuration and operational state (interfaces,
//! NAT proxy-ARP entries, routes, ...) as addressable tables. A table calls
//! one RPC on a device session, keeps the XML reply, and exposes the
//! repeating records in it by name, by position, or by iteration. Each
//! record comes back as raw XML or rendered through a view.
//!
//! ## Features
//!
//! - **Tables**: count, keys, name lookup, positive and negative positions,
//!   restartable iteration, composite (single-record) tables
//! - **Views**: Rust view types, closures, or declarative field lists
//! - **Catalogs**: table and view definitions in YAML or JSON, checked before
//!   any RPC is sent
//! - **Offline sessions**: canned replies, exchange recording to JSONL and
//!   replay for fixture-driven tests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use rjunos::catalog::TableCatalog;
//! use rjunos::rpc::RpcArgs;
//! use rjunos::session::StaticSession;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = TableCatalog::from_yaml(
//!     r#"
//! tables:
//!   PhyPortTable:
//!     rpc: get-interface-information
//!     args: { terse: true }
//!     item: physical-interface
//!     view: PhyPortView
//! views:
//!   PhyPortView:
//!     fields:
//!       oper: oper-status
//! "#,
//! )?;
//!
//! let session = StaticSession::new("vsrx").with_reply(
//!     "get-interface-information",
//!     "<interface-information><physical-interface>\
//!        <name>ge-0/0/0</name><oper-status>up</oper-status>\
//!      </physical-interface></interface-information>",
//! );
//!
//! let mut ports = catalog.table("PhyPortTable", Arc::new(session))?;
//! ports.fetch(&RpcArgs::new())?;
//!
//! for (name, fields) in ports.items()? {
//!     println!("{name}: {fields:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Main Components
//!
//! - [`table::Table`] - Indexable, iterable view of one RPC reply
//! - [`view::View`] / [`view::ViewClass`] - Per-record rendering
//! - [`catalog::TableCatalog`] - Declarative table and view registration
//! - [`session::Session`] - Device handle the tables call through
//! - [`error::TableError`] / [`error::RpcError`] - Error types

pub mod catalog;
pub mod error;
pub mod rpc;
pub mod session;
pub mod table;
pub mod view;
pub mod xml;
pub mod xpath;
