//! Decouples a shadow node's stub interfaces from whichever
//! [`ConnectionContext`] happens to be active, so client code can issue
//! calls before, during, and after the connection bounces (§4.6).

use crate::connection::{CallHandle, ConnectionContext};
use crate::pending::RpcError;
use octf_proto::{InterfaceId, NodePath};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How long [`RpcProxy::send`] waits for a connection to appear before
/// failing the call with "No connection" (§4.6).
const CONNECT_WAIT: Duration = Duration::from_millis(500);

pub struct RpcProxy {
    current: Mutex<Option<ConnectionContext>>,
    notify: Arc<Notify>,
}

impl Default for RpcProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcProxy {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn set_connection(&self, ctx: ConnectionContext) {
        *self.current.lock() = Some(ctx);
        self.notify.notify_waiters();
    }

    pub fn clear_connection(&self) {
        *self.current.lock() = None;
    }

    pub fn has_connection(&self) -> bool {
        self.current.lock().as_ref().is_some_and(ConnectionContext::is_active)
    }

    /// Sends a method call through the currently-active connection,
    /// waiting up to [`CONNECT_WAIT`] for one to appear if none is set.
    pub async fn send(
        &self,
        target: &NodePath,
        interface: &InterfaceId,
        method_index: u32,
        request: Vec<u8>,
    ) -> Result<CallHandle, RpcError> {
        let ctx = self.current_or_wait().await?;
        Ok(ctx.call(target, interface, method_index, request).await)
    }

    async fn current_or_wait(&self) -> Result<ConnectionContext, RpcError> {
        if let Some(ctx) = self.snapshot() {
            return Ok(ctx);
        }

        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(CONNECT_WAIT) => {}
        }

        self.snapshot().ok_or(RpcError::NoConnection)
    }

    fn snapshot(&self) -> Option<ConnectionContext> {
        self.current
            .lock()
            .as_ref()
            .filter(|ctx| ctx.is_active())
            .cloned()
    }
}
