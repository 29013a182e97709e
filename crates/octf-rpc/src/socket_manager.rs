//! One client or server endpoint driven through the `Initializing` ->
//! `Working` -> `Idle` state machine of §4.8, reopening on error until an
//! explicit [`SocketManager::deactivate`]. Each accepted/connected socket
//! is handed out as a fresh [`ConnectionContext`] over an unbounded
//! channel; the caller decides what to do with it (install it on an
//! [`crate::proxy::RpcProxy`], track it in a connection-context map, ...).

use crate::connection::ConnectionContext;
use crate::dispatch::Dispatch;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};

/// Sleep between a failed bind/connect (or a connection closing) and the
/// next attempt, matching the 300ms the original socket manager used.
const IDLE_BACKOFF: Duration = Duration::from_millis(300);

pub struct SocketManager {
    deactivate: Arc<Notify>,
    deactivated: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SocketManager {
    /// Listens on `socket_path`, handing each accepted connection a
    /// [`Dispatch`] so it can serve inbound method requests.
    pub fn server(
        socket_path: PathBuf,
        dispatch: Arc<dyn Dispatch>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionContext>) {
        let (new_conn_tx, new_conn_rx) = mpsc::unbounded_channel();
        let deactivated = Arc::new(AtomicBool::new(false));
        let deactivate = Arc::new(Notify::new());

        let task = {
            let deactivated = deactivated.clone();
            let deactivate_signal = deactivate.clone();
            tokio::spawn(async move {
                let mut next_conn_id: u64 = 1;
                while !deactivated.load(Ordering::SeqCst) {
                    let listener = match bind_server_socket(&socket_path) {
                        Ok(listener) => listener,
                        Err(err) => {
                            tracing::warn!(path = ?socket_path, %err, "failed to bind socket, retrying");
                            sleep_or_deactivate(IDLE_BACKOFF, &deactivate_signal, &deactivated).await;
                            continue;
                        }
                    };

                    loop {
                        tokio::select! {
                            biased;
                            _ = deactivate_signal.notified() => break,
                            accepted = listener.accept() => match accepted {
                                Ok((stream, _addr)) => {
                                    let id = next_conn_id;
                                    next_conn_id += 1;
                                    let (r, w) = stream.into_split();
                                    let ctx = ConnectionContext::spawn(id, r, w, Some(dispatch.clone()));
                                    if new_conn_tx.send(ctx).is_err() {
                                        deactivated.store(true, Ordering::SeqCst);
                                        break;
                                    }
                                }
                                Err(err) => {
                                    tracing::warn!(%err, "accept failed, reinitializing listener");
                                    break;
                                }
                            },
                        }
                        if deactivated.load(Ordering::SeqCst) {
                            break;
                        }
                    }

                    if deactivated.load(Ordering::SeqCst) {
                        break;
                    }
                    sleep_or_deactivate(IDLE_BACKOFF, &deactivate_signal, &deactivated).await;
                }
            })
        };

        (
            Self {
                deactivate,
                deactivated,
                task: Some(task),
            },
            new_conn_rx,
        )
    }

    /// Dials `socket_path` in a loop, handing out one [`ConnectionContext`]
    /// per successful connect and waiting for it to expire before
    /// reconnecting. `dispatch` is `Some` when the client must also serve
    /// inbound requests over the same socket (a bidirectional channel).
    pub fn client(
        socket_path: PathBuf,
        dispatch: Option<Arc<dyn Dispatch>>,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionContext>) {
        let (new_conn_tx, new_conn_rx) = mpsc::unbounded_channel();
        let deactivated = Arc::new(AtomicBool::new(false));
        let deactivate = Arc::new(Notify::new());

        let task = {
            let deactivated = deactivated.clone();
            let deactivate_signal = deactivate.clone();
            tokio::spawn(async move {
                let mut next_conn_id: u64 = 1;
                while !deactivated.load(Ordering::SeqCst) {
                    let stream = match UnixStream::connect(&socket_path).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            tracing::warn!(path = ?socket_path, %err, "failed to connect, retrying");
                            sleep_or_deactivate(IDLE_BACKOFF, &deactivate_signal, &deactivated).await;
                            continue;
                        }
                    };

                    let id = next_conn_id;
                    next_conn_id += 1;
                    let (r, w) = stream.into_split();
                    let ctx = ConnectionContext::spawn(id, r, w, dispatch.clone());
                    if new_conn_tx.send(ctx.clone()).is_err() {
                        deactivated.store(true, Ordering::SeqCst);
                        break;
                    }

                    tokio::select! {
                        _ = ctx.wait_expired() => {}
                        _ = deactivate_signal.notified() => break,
                    }

                    if deactivated.load(Ordering::SeqCst) {
                        break;
                    }
                    sleep_or_deactivate(IDLE_BACKOFF, &deactivate_signal, &deactivated).await;
                }
            })
        };

        (
            Self {
                deactivate,
                deactivated,
                task: Some(task),
            },
            new_conn_rx,
        )
    }

    /// Tears the manager down. The manager never gives up on its own
    /// (§4.8); this is the only way to stop the reconnect loop.
    pub fn deactivate(&self) {
        self.deactivated.store(true, Ordering::SeqCst);
        self.deactivate.notify_waiters();
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        self.deactivate();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn sleep_or_deactivate(duration: Duration, deactivate: &Notify, flag: &AtomicBool) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = deactivate.notified() => flag.store(true, Ordering::SeqCst),
    }
}

fn bind_server_socket(path: &Path) -> std::io::Result<UnixListener> {
    // A prior crash can leave a stale socket file behind; binding over it
    // is how a restarted service reclaims the path.
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)?;
    set_socket_permissions(path)?;
    Ok(listener)
}

/// rw for the service user and its group, no execute bit, matching §6's
/// module-discovery contract (presence + these bits signal a live socket).
#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
