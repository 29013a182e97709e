//! Wire types shared by the trace archive and the node/interface RPC fabric.
//!
//! `gen` holds the `prost`-derived message types (checked in; see `build.rs`
//! for how they are refreshed from `proto/octf.proto`). `node` holds the
//! hand-written `NodeId`/`NodePath`/`InterfaceId` domain types that wrap the
//! generated wire representations (`repeated string`, `(name, version)`)
//! with validation.

pub mod any;
pub mod gen;
mod node;

pub use node::{InterfaceId, NodeId, NodeIdError, NodePath, NodePathError};

/// Maximum payload size accepted by the packet framer and the RPC layer
/// built on top of it.
pub const MAX_PACKET_PAYLOAD_BYTES: usize = 32 * 1024 * 1024;
