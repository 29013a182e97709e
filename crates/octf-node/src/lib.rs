//! Hierarchical node tree with versioned interfaces, the reserved identity
//! interface, and optional per-node settings persistence.

mod interface;
mod node;
mod settings;

pub use interface::{
    Interface, InterfaceError, IdentityInterface, StubInterface, IDENTITY_INTERFACE_NAME,
    IDENTITY_INTERFACE_VERSION, IDENTITY_METHOD_GET_CHILDREN, IDENTITY_METHOD_GET_INTERFACES,
    IDENTITY_METHOD_GET_NODE_ID,
};
pub use node::{add_child, new_root, remove_child, Node, NodeBehavior, NodeError, NodeTree, NoopBehavior};
pub use settings::{remove_settings, SettingsError, SettingsStore};
