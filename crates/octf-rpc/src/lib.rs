//! The node/interface RPC fabric (§4.4-§4.8, §4.6): a length-prefixed
//! packet framer, a connection context that demultiplexes packets to
//! pending calls and to a local dispatcher, an RPC proxy that decouples a
//! shadow node from whichever connection happens to be live, and a socket
//! manager that keeps one client or server endpoint alive.

mod connection;
mod dispatch;
mod framer;
mod pending;
mod proxy;
mod socket_manager;

pub use connection::{CallHandle, ConnectionContext};
pub use dispatch::{Dispatch, DispatchError};
pub use framer::{read_packet, write_packet, FramingError, MAX_PACKET_PAYLOAD_BYTES};
pub use pending::{Controller, RpcError};
pub use proxy::RpcProxy;
pub use socket_manager::SocketManager;
