//! Controller and pending-call bookkeeping shared between the client and
//! server roles of a [`crate::connection::ConnectionContext`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Carries failure text and a cancellation flag for one in-flight call,
/// shared between the caller and (on the server side) the method
/// implementation, which is expected to check `is_cancelled` at safe
/// points rather than being interrupted.
#[derive(Clone, Default)]
pub struct Controller {
    inner: Arc<ControllerState>,
}

#[derive(Default)]
struct ControllerState {
    cancelled: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn set_failure(&self, text: impl Into<String>) {
        *self.inner.failure.lock() = Some(text.into());
    }

    pub fn failure(&self) -> Option<String> {
        self.inner.failure.lock().clone()
    }
}

/// Outcome of a completed client-side call, matching §3's Pending Call
/// lifecycle: a successful reply, a connection that dropped out from under
/// the call, or a locally-initiated cancel.
#[derive(thiserror::Error, Debug, Clone)]
pub enum RpcError {
    #[error("No connection")]
    NoConnection,
    #[error("cannot parse response")]
    CannotParseResponse,
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Remote(String),
}

/// One outstanding client call: the sequence id it was assigned, the
/// controller it shares with the caller, and the one-shot channel its
/// result is delivered through.
pub(crate) struct PendingEntry {
    pub controller: Controller,
    pub done: tokio::sync::oneshot::Sender<Result<Vec<u8>, RpcError>>,
}
