//! The capability a node exposes at one [`InterfaceId`]: a service
//! interface implements methods server-side; a stub interface forwards the
//! same calls to whatever connection an [`octf_rpc::RpcProxy`] currently
//! holds. Both share the same `InterfaceId` (§3).

use crate::node::Node;
use async_trait::async_trait;
use octf_proto::gen::{IdentityChildren, IdentityInterfaces, IdentityNodeId};
use octf_proto::InterfaceId;
use octf_rpc::{Controller, RpcError, RpcProxy};
use prost::Message;
use std::sync::{Arc, Weak};

#[derive(thiserror::Error, Debug, Clone)]
pub enum InterfaceError {
    #[error("no such method {0}")]
    NoSuchMethod(u32),
    #[error("cannot parse input")]
    CannotParseInput,
    #[error("{0}")]
    Failed(String),
}

/// A callable capability set registered on a [`Node`] under one
/// [`InterfaceId`]. Implementations run server-side; see [`StubInterface`]
/// for the client-side counterpart.
#[async_trait]
pub trait Interface: Send + Sync {
    fn id(&self) -> InterfaceId;

    async fn call(
        &self,
        method_index: u32,
        request: &[u8],
        controller: &Controller,
    ) -> Result<Vec<u8>, InterfaceError>;
}

pub const IDENTITY_INTERFACE_NAME: &str = "identity";
pub const IDENTITY_INTERFACE_VERSION: u32 = 1;

pub const IDENTITY_METHOD_GET_NODE_ID: u32 = 0;
pub const IDENTITY_METHOD_GET_CHILDREN: u32 = 1;
pub const IDENTITY_METHOD_GET_INTERFACES: u32 = 2;

/// Reserved by every node at `init_common` (§4.7): `get_node_id`,
/// `get_children`, `get_interfaces`. This is how a client introspects the
/// tree over RPC. Holds a `Weak` back to its node -- the node owns this
/// interface via an `Arc`, so a strong back-reference would cycle.
pub struct IdentityInterface {
    node: Weak<Node>,
}

impl IdentityInterface {
    pub fn new(node: Weak<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl Interface for IdentityInterface {
    fn id(&self) -> InterfaceId {
        InterfaceId::new(IDENTITY_INTERFACE_NAME, IDENTITY_INTERFACE_VERSION)
    }

    async fn call(
        &self,
        method_index: u32,
        _request: &[u8],
        _controller: &Controller,
    ) -> Result<Vec<u8>, InterfaceError> {
        let node = self
            .node
            .upgrade()
            .ok_or_else(|| InterfaceError::Failed("node no longer exists".to_string()))?;

        match method_index {
            IDENTITY_METHOD_GET_NODE_ID => Ok(IdentityNodeId {
                id: node.id().to_string(),
            }
            .encode_to_vec()),
            IDENTITY_METHOD_GET_CHILDREN => Ok(IdentityChildren {
                ids: node.get_children_ids().iter().map(ToString::to_string).collect(),
            }
            .encode_to_vec()),
            IDENTITY_METHOD_GET_INTERFACES => Ok(IdentityInterfaces {
                interfaces: node.get_interfaces_ids().iter().map(Into::into).collect(),
            }
            .encode_to_vec()),
            other => Err(InterfaceError::NoSuchMethod(other)),
        }
    }
}

/// Client-side stand-in for a remote interface: every call is forwarded
/// through the [`RpcProxy`] to whatever connection is currently live,
/// rather than executed locally.
pub struct StubInterface {
    id: InterfaceId,
    target: octf_proto::NodePath,
    proxy: Arc<RpcProxy>,
}

impl StubInterface {
    pub fn new(id: InterfaceId, target: octf_proto::NodePath, proxy: Arc<RpcProxy>) -> Self {
        Self { id, target, proxy }
    }

    pub fn id(&self) -> &InterfaceId {
        &self.id
    }

    pub async fn call(&self, method_index: u32, request: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let handle = self.proxy.send(&self.target, &self.id, method_index, request).await?;
        handle.wait().await
    }
}
