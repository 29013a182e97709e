//! Decouples [`crate::connection::ConnectionContext`] from the node tree:
//! the connection only needs something that can route an inbound
//! `MethodRequest` to a method and get bytes back, not a concrete `Node`
//! type. `octf-node` implements this trait over its root node so the two
//! crates don't depend on each other.

use crate::pending::Controller;
use async_trait::async_trait;
use octf_proto::{InterfaceId, NodePath};

#[derive(thiserror::Error, Debug, Clone)]
pub enum DispatchError {
    #[error("No such node")]
    NoSuchNode,
    #[error("No such interface")]
    NoSuchInterface,
    #[error("Cannot parse input")]
    CannotParseInput,
    #[error("{0}")]
    MethodFailed(String),
}

#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        target: &NodePath,
        interface: &InterfaceId,
        method_index: u32,
        request: &[u8],
        controller: Controller,
    ) -> Result<Vec<u8>, DispatchError>;
}
