//! One live stream socket, demultiplexing framed [`Packet`]s to pending
//! client calls and to the local node tree (§4.5).
//!
//! A connection is constructed over an already-connected/-accepted stream,
//! so the `opening` state in §4.5's state machine is momentary and not
//! separately observable here -- a `ConnectionContext` is `active` from
//! the moment it exists, and transitions to `expired` on any RX/TX error or
//! an explicit [`ConnectionContext::close`].

use crate::dispatch::{Dispatch, DispatchError};
use crate::framer::{self, FramingError};
use crate::pending::{Controller, PendingEntry, RpcError};
use octf_proto::gen::PacketKind as Kind;
use octf_proto::gen::{Cancel, MethodRequest, MethodResponse, Packet};
use octf_proto::{InterfaceId, NodePath};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};

struct Inner {
    id: u64,
    tx: AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>,
    next_sid: AtomicU64,
    pending: Mutex<HashMap<u64, PendingEntry>>,
    inflight: Mutex<HashMap<u64, Controller>>,
    expired: AtomicBool,
    expired_notify: Notify,
}

/// Shared handle to one connection. Cheap to clone; clones share the same
/// pending-call table, TX lock, and expiry flag.
#[derive(Clone)]
pub struct ConnectionContext {
    inner: Arc<Inner>,
}

/// A client call that was sent and is awaiting (or has received) a reply.
pub struct CallHandle {
    sid: u64,
    controller: Controller,
    rx: oneshot::Receiver<Result<Vec<u8>, RpcError>>,
    conn: ConnectionContext,
}

impl CallHandle {
    pub fn sid(&self) -> u64 {
        self.sid
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Waits indefinitely for the reply, or for the connection to expire.
    pub async fn wait(mut self) -> Result<Vec<u8>, RpcError> {
        (&mut self.rx).await.unwrap_or(Err(RpcError::NoConnection))
    }

    /// Waits up to `timeout`. Returns `None` on timeout without cancelling
    /// the remote call (§5): the receiver isn't consumed, so a later
    /// `wait_for`/`wait` on the same handle can still observe the eventual
    /// reply, and `start_cancel` remains the only way to actually abort.
    pub async fn wait_for(&mut self, timeout: Duration) -> Option<Result<Vec<u8>, RpcError>> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(result) => Some(result.unwrap_or(Err(RpcError::NoConnection))),
            Err(_elapsed) => None,
        }
    }

    /// Fails the call locally with `IsCanceled=true` immediately, and
    /// sends a best-effort Cancel packet so the server stops doing work.
    /// A later `MethodResponse` for this sid is dropped by the RX loop.
    pub async fn start_cancel(self) {
        self.conn.cancel_call(self.sid).await;
    }
}

impl ConnectionContext {
    /// Spawns the RX loop over `reader`/`writer` and returns the handle.
    /// `dispatch` is `Some` for a connection that must serve inbound method
    /// requests (the server role); a pure client connection passes `None`.
    pub fn spawn<R, W>(id: u64, reader: R, writer: W, dispatch: Option<Arc<dyn Dispatch>>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let inner = Arc::new(Inner {
            id,
            tx: AsyncMutex::new(Box::new(writer)),
            next_sid: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            expired: AtomicBool::new(false),
            expired_notify: Notify::new(),
        });

        let ctx = Self { inner };
        let rx_ctx = ctx.clone();
        tokio::spawn(async move {
            rx_ctx.rx_loop(reader, dispatch).await;
        });
        ctx
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        !self.inner.expired.load(Ordering::SeqCst)
    }

    /// Explicit close: expires the connection and fails every pending
    /// call with "No connection", same as an RX/TX error would.
    pub async fn close(&self) {
        self.expire().await;
    }

    /// Resolves once this connection has expired (RX/TX error or explicit
    /// `close`). Resolves immediately if it already has.
    pub async fn wait_expired(&self) {
        loop {
            let notified = self.inner.expired_notify.notified();
            if !self.is_active() {
                return;
            }
            notified.await;
            if !self.is_active() {
                return;
            }
        }
    }

    async fn rx_loop<R>(&self, mut reader: R, dispatch: Option<Arc<dyn Dispatch>>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        loop {
            match framer::read_packet(&mut reader).await {
                Ok(packet) => self.handle_packet(packet, dispatch.as_ref()).await,
                Err(err) => {
                    tracing::warn!(conn = self.inner.id, %err, "connection RX error, expiring");
                    break;
                }
            }
        }
        self.expire().await;
    }

    async fn handle_packet(&self, packet: Packet, dispatch: Option<&Arc<dyn Dispatch>>) {
        match packet.kind {
            Some(Kind::MethodResponse(resp)) => self.complete_pending(resp),
            Some(Kind::MethodRequest(req)) => self.serve_request(req, dispatch).await,
            Some(Kind::Cancel(Cancel { sid })) => {
                if let Some(controller) = self.inner.inflight.lock().get(&sid).cloned() {
                    controller.cancel();
                }
            }
            None => tracing::warn!(conn = self.inner.id, "received a packet with no kind set"),
        }
    }

    fn complete_pending(&self, resp: MethodResponse) {
        let entry = self.inner.pending.lock().remove(&resp.sid);
        let Some(entry) = entry else {
            tracing::debug!(conn = self.inner.id, sid = resp.sid, "dropping response for unknown or cancelled sid");
            return;
        };
        let result = if resp.success {
            Ok(resp.response)
        } else {
            Err(RpcError::Remote(resp.error_text))
        };
        let _ = entry.done.send(result);
    }

    async fn serve_request(&self, req: MethodRequest, dispatch: Option<&Arc<dyn Dispatch>>) {
        let sid = req.sid;
        let Some(dispatch) = dispatch else {
            tracing::warn!(conn = self.inner.id, sid, "no dispatcher installed on this connection, dropping request");
            return;
        };

        let target = match NodePath::from_wire(&req.node_path) {
            Ok(path) => path,
            Err(_) => {
                self.reply_failure(sid, "No such node").await;
                return;
            }
        };
        let Some(interface) = req.interface else {
            self.reply_failure(sid, "No such interface").await;
            return;
        };
        let interface: InterfaceId = interface.into();

        let controller = Controller::new();
        self.inner.inflight.lock().insert(sid, controller.clone());

        let result = dispatch
            .dispatch(&target, &interface, req.method_index, &req.request, controller)
            .await;

        self.inner.inflight.lock().remove(&sid);

        match result {
            Ok(response) => {
                let packet = Packet {
                    kind: Some(Kind::MethodResponse(MethodResponse {
                        sid,
                        success: true,
                        error_text: String::new(),
                        response,
                    })),
                };
                if let Err(err) = self.send_packet(&packet).await {
                    tracing::warn!(conn = self.inner.id, sid, %err, "failed to send method response");
                }
            }
            Err(err) => self.reply_failure(sid, dispatch_error_text(&err)).await,
        }
    }

    async fn reply_failure(&self, sid: u64, text: impl Into<String>) {
        let packet = Packet {
            kind: Some(Kind::MethodResponse(MethodResponse {
                sid,
                success: false,
                error_text: text.into(),
                response: Vec::new(),
            })),
        };
        if let Err(err) = self.send_packet(&packet).await {
            tracing::warn!(conn = self.inner.id, sid, %err, "failed to send failure response");
        }
    }

    /// Issues one client method call and returns a handle the caller
    /// suspends on. Matches §4.5's "sending a client method" steps.
    pub async fn call(
        &self,
        target: &NodePath,
        interface: &InterfaceId,
        method_index: u32,
        request: Vec<u8>,
    ) -> CallHandle {
        let sid = self.inner.next_sid.fetch_add(1, Ordering::SeqCst);
        let controller = Controller::new();
        let (done, rx) = oneshot::channel();
        self.inner.pending.lock().insert(
            sid,
            PendingEntry {
                controller: controller.clone(),
                done,
            },
        );

        let packet = Packet {
            kind: Some(Kind::MethodRequest(MethodRequest {
                node_path: target.to_wire(),
                interface: Some(interface.into()),
                method_index,
                sid,
                request,
            })),
        };

        if let Err(err) = self.send_packet(&packet).await {
            tracing::warn!(conn = self.inner.id, sid, %err, "failed to send method request");
            if let Some(entry) = self.inner.pending.lock().remove(&sid) {
                let _ = entry.done.send(Err(RpcError::NoConnection));
            }
        }

        CallHandle {
            sid,
            controller,
            rx,
            conn: self.clone(),
        }
    }

    pub(crate) async fn cancel_call(&self, sid: u64) {
        if let Some(entry) = self.inner.pending.lock().remove(&sid) {
            entry.controller.cancel();
            let _ = entry.done.send(Err(RpcError::Cancelled));
        }
        let packet = Packet {
            kind: Some(Kind::Cancel(Cancel { sid })),
        };
        let _ = self.send_packet(&packet).await;
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), FramingError> {
        let mut tx = self.inner.tx.lock().await;
        framer::write_packet(&mut *tx, packet).await
    }

    async fn expire(&self) {
        self.inner.expired.store(true, Ordering::SeqCst);
        self.inner.expired_notify.notify_waiters();
        let pending: Vec<_> = self.inner.pending.lock().drain().collect();
        for (_, entry) in pending {
            let _ = entry.done.send(Err(RpcError::NoConnection));
        }
    }
}

fn dispatch_error_text(err: &DispatchError) -> String {
    err.to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct EchoDispatch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Dispatch for EchoDispatch {
        async fn dispatch(
            &self,
            _target: &NodePath,
            _interface: &InterfaceId,
            _method_index: u32,
            request: &[u8],
            _controller: Controller,
        ) -> Result<Vec<u8>, DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(request.to_vec())
        }
    }

    fn node_path() -> NodePath {
        NodePath::root(octf_proto::NodeId::new("root").unwrap())
    }

    fn interface_id() -> InterfaceId {
        InterfaceId::new("echo", 1)
    }

    #[tokio::test]
    async fn call_round_trips_through_a_duplex_pair() {
        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (server_read, server_write) = tokio::io::split(server_stream);

        let dispatch = Arc::new(EchoDispatch {
            calls: AtomicUsize::new(0),
        });
        let _server = ConnectionContext::spawn(1, server_read, server_write, Some(dispatch.clone()));
        let client = ConnectionContext::spawn(2, client_read, client_write, None);

        let handle = client
            .call(&node_path(), &interface_id(), 0, b"hello".to_vec())
            .await;
        let response = handle.wait().await.unwrap();
        assert_eq!(response, b"hello");
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closing_the_connection_fails_pending_calls() {
        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_stream);
        drop(server_stream);

        let client = ConnectionContext::spawn(3, client_read, client_write, None);
        let handle = client
            .call(&node_path(), &interface_id(), 0, b"x".to_vec())
            .await;
        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, RpcError::NoConnection));
    }

    #[tokio::test]
    async fn cancel_completes_locally_and_drops_late_response() {
        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_stream);
        let (mut server_read, mut server_write) = tokio::io::split(server_stream);

        let client = ConnectionContext::spawn(4, client_read, client_write, None);
        let handle = client
            .call(&node_path(), &interface_id(), 0, b"x".to_vec())
            .await;
        let sid = handle.sid();

        // Drain the MethodRequest the server side would have received.
        let _req = framer::read_packet(&mut server_read).await.unwrap();

        handle.start_cancel().await;

        // A tardy MethodResponse for the already-cancelled sid must be
        // dropped without resurfacing to any caller.
        let late = Packet {
            kind: Some(Kind::MethodResponse(MethodResponse {
                sid,
                success: true,
                error_text: String::new(),
                response: b"too-late".to_vec(),
            })),
        };
        framer::write_packet(&mut server_write, &late).await.unwrap();
    }
}
