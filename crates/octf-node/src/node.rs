//! The node tree (§3, §4.7): a parent exclusively owns its children;
//! interfaces are shared between the node and any client that has looked
//! them up via an `Arc` clone, which is also how a lookup "bumps a
//! refcount so the node cannot be destroyed mid-call" (§5) -- there's no
//! separate locking needed for that guarantee, just holding the clone.

use crate::interface::{IdentityInterface, Interface, InterfaceError};
use crate::settings::{load_settings, write_settings, SettingsStore};
use async_trait::async_trait;
use octf_proto::{InterfaceId, NodeId, NodePath};
use octf_rpc::{Controller, Dispatch, DispatchError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("child node id {0} already exists")]
    DuplicateChild(NodeId),
    #[error("interface {0} already exists")]
    DuplicateInterface(InterfaceId),
    #[error("node failed to initialize: {0}")]
    InitFailed(String),
}

/// Domain-specific hooks invoked around the common identity/settings
/// machinery, matching §3's created -> init_common -> init_custom -> live
/// -> deinit_custom -> deinit_common -> destroyed lifecycle. Both default
/// to no-ops so a plain data node needs no behavior at all.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    async fn init_custom(&self, _node: &Arc<Node>) -> Result<(), String> {
        Ok(())
    }

    async fn deinit_custom(&self, _node: &Arc<Node>) {}
}

/// A behavior with nothing to add beyond the common identity interface.
pub struct NoopBehavior;

#[async_trait]
impl NodeBehavior for NoopBehavior {}

pub struct Node {
    path: NodePath,
    children: RwLock<HashMap<NodeId, Arc<Node>>>,
    interfaces: RwLock<HashMap<InterfaceId, Arc<dyn Interface>>>,
    settings: Option<Arc<dyn SettingsStore>>,
    behavior: Box<dyn NodeBehavior>,
}

impl Node {
    fn new(path: NodePath, behavior: Box<dyn NodeBehavior>, settings: Option<Arc<dyn SettingsStore>>) -> Arc<Node> {
        Arc::new(Node {
            path,
            children: RwLock::new(HashMap::new()),
            interfaces: RwLock::new(HashMap::new()),
            settings,
            behavior,
        })
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn id(&self) -> &NodeId {
        self.path.as_slice().last().expect("NodePath is never empty")
    }

    pub fn get_child(&self, id: &NodeId) -> Option<Arc<Node>> {
        self.children.read().get(id).cloned()
    }

    pub fn get_children_ids(&self) -> Vec<NodeId> {
        self.children.read().keys().cloned().collect()
    }

    pub fn add_interface(&self, interface: Arc<dyn Interface>) -> Result<(), NodeError> {
        let id = interface.id();
        let mut interfaces = self.interfaces.write();
        if interfaces.contains_key(&id) {
            return Err(NodeError::DuplicateInterface(id));
        }
        interfaces.insert(id, interface);
        Ok(())
    }

    pub fn get_interface(&self, id: &InterfaceId) -> Option<Arc<dyn Interface>> {
        self.interfaces.read().get(id).cloned()
    }

    pub fn get_interfaces_ids(&self) -> Vec<InterfaceId> {
        self.interfaces.read().keys().cloned().collect()
    }
}

/// Constructs and initializes the root of a tree: `init_common` (reserves
/// the identity interface, loads settings if persisted) then
/// `init_custom`.
pub async fn new_root(
    id: NodeId,
    behavior: Box<dyn NodeBehavior>,
    settings: Option<Arc<dyn SettingsStore>>,
    settings_dir: Option<&Path>,
) -> Result<Arc<Node>, NodeError> {
    let root = Node::new(NodePath::root(id), behavior, settings);
    init_node(&root, settings_dir).await?;
    Ok(root)
}

/// Constructs, initializes, and attaches a child under `parent`. Rejects a
/// duplicate `NodeId`; on an `init_custom` failure the half-initialized
/// child is torn down and never attached (§4.7).
pub async fn add_child(
    parent: &Arc<Node>,
    id: NodeId,
    behavior: Box<dyn NodeBehavior>,
    settings: Option<Arc<dyn SettingsStore>>,
    settings_dir: Option<&Path>,
) -> Result<Arc<Node>, NodeError> {
    if parent.children.read().contains_key(&id) {
        return Err(NodeError::DuplicateChild(id));
    }

    let child = Node::new(parent.path.child(id.clone()), behavior, settings);
    if let Err(err) = init_node(&child, settings_dir).await {
        deinit_node(&child, settings_dir).await;
        return Err(err);
    }

    let mut children = parent.children.write();
    if children.contains_key(&id) {
        drop(children);
        deinit_node(&child, settings_dir).await;
        return Err(NodeError::DuplicateChild(id));
    }
    children.insert(id, child.clone());
    Ok(child)
}

/// Detaches and deinitializes `id` from `parent`, if present. Removing a
/// child triggers `deinit` (§3).
pub async fn remove_child(
    parent: &Arc<Node>,
    id: &NodeId,
    settings_dir: Option<&Path>,
) -> Option<Arc<Node>> {
    let child = parent.children.write().remove(id)?;
    deinit_node(&child, settings_dir).await;
    Some(child)
}

async fn init_node(node: &Arc<Node>, settings_dir: Option<&Path>) -> Result<(), NodeError> {
    let identity = Arc::new(IdentityInterface::new(Arc::downgrade(node)));
    node.interfaces.write().insert(identity.id(), identity);

    if let (Some(store), Some(dir)) = (&node.settings, settings_dir) {
        load_settings(store.as_ref(), dir, &node.path).await;
    }

    node.behavior
        .init_custom(node)
        .await
        .map_err(NodeError::InitFailed)
}

async fn deinit_node(node: &Arc<Node>, settings_dir: Option<&Path>) {
    node.behavior.deinit_custom(node).await;
    if let (Some(store), Some(dir)) = (&node.settings, settings_dir) {
        write_settings(store.as_ref(), dir, &node.path).await;
    }
}

/// Owns the root `Arc<Node>` so a node doesn't need a self-referential
/// strong pointer just to be addressable from the RPC dispatcher (§9's
/// "self-referential root node" redesign note).
#[derive(Clone)]
pub struct NodeTree {
    root: Arc<Node>,
}

impl NodeTree {
    pub fn new(root: Arc<Node>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Walks `path`, matching its first element against `node` and then
    /// each subsequent element against that node's children.
    pub fn get_child_by_path(&self, path: &NodePath) -> Option<Arc<Node>> {
        resolve(&self.root, path.as_slice())
    }
}

fn resolve(node: &Arc<Node>, remaining: &[NodeId]) -> Option<Arc<Node>> {
    let (first, rest) = remaining.split_first()?;
    if first != node.id() {
        return None;
    }
    if rest.is_empty() {
        return Some(node.clone());
    }
    let child = node.get_child(&rest[0])?;
    resolve(&child, rest)
}

#[async_trait]
impl Dispatch for NodeTree {
    async fn dispatch(
        &self,
        target: &NodePath,
        interface: &InterfaceId,
        method_index: u32,
        request: &[u8],
        controller: Controller,
    ) -> Result<Vec<u8>, DispatchError> {
        let node = self.get_child_by_path(target).ok_or(DispatchError::NoSuchNode)?;
        let iface = node.get_interface(interface).ok_or(DispatchError::NoSuchInterface)?;
        iface.call(method_index, request, &controller).await.map_err(|err| match err {
            InterfaceError::CannotParseInput => DispatchError::CannotParseInput,
            InterfaceError::NoSuchMethod(_) | InterfaceError::Failed(_) => {
                DispatchError::MethodFailed(err.to_string())
            }
        })
    }
}
