//! svn:// protocol server
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  accept   ┌─────────────────────────────────────────┐
//! │  SvnServer   │ ────────► │ Session (one tokio task per connection)  │
//! │ accept task  │           │  WireReader / WireWriter                 │
//! └──────┬───────┘           │  handshake ► auth ► command loop         │
//!        │                   │  step queue: log, report, editor drive   │
//!        │ live connections  └───────────────┬─────────────────────────┘
//!        ▼                                   │
//!  id -> AbortHandle                         ▼
//!                              Branch ──► RevisionCache ──► ObjectStore
//! ```
//!
//! # Shutdown
//!
//! 1. The accept task is cancelled and drops the listener.
//! 2. Running sessions get `shutdown_grace` to finish.
//! 3. Sessions still alive are aborted, which closes their sockets, and get
//!    [`FORCE_SHUTDOWN`] to unwind.
//! 4. The shared context is closed in reverse registration order.
//!
//! # Locking
//!
//! The live-connection map is the only lock owned by the server. It is held
//! while a session task is spawned so the task cannot deregister itself
//! before it has been registered.

mod command;
mod session;
mod state;
mod step;

pub use session::{Session, SessionState};
pub use state::{ServerSettings, ServerState};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::context::SharedContext;
use crate::error::Result;
use crate::wire::{WireReader, WireWriter};

/// Time aborted sessions get to release their resources
pub const FORCE_SHUTDOWN: Duration = Duration::from_secs(5);

type Connections = Arc<Mutex<HashMap<u64, AbortHandle>>>;

/// Listening server plus the handles needed to stop it
pub struct SvnServer {
    local_addr: SocketAddr,
    state: Arc<ServerState>,
    shared: Arc<SharedContext>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    accept_task: JoinHandle<()>,
    connections: Connections,
}

impl SvnServer {
    /// Bind `addr` and start accepting connections
    pub async fn bind(addr: &str, settings: ServerSettings, shared: Arc<SharedContext>) -> Result<Self> {
        let state = Arc::new(ServerState::new(settings, &shared)?);
        Self::bind_with_state(addr, state, shared).await
    }

    pub async fn bind_with_state(
        addr: &str,
        state: Arc<ServerState>,
        shared: Arc<SharedContext>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let connections: Connections = Arc::new(Mutex::new(HashMap::new()));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            state.clone(),
            cancel.clone(),
            tracker.clone(),
            connections.clone(),
        ));

        tracing::info!("Listening on svn://{}", local_addr);
        Ok(Self {
            local_addr,
            state,
            shared,
            cancel,
            tracker,
            accept_task,
            connections,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of sessions currently running
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Stop accepting, drain sessions and close shared services
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("Shutting down svn://{}", self.local_addr);
        self.cancel.cancel();
        if let Err(e) = self.accept_task.await {
            tracing::error!("Accept loop failed: {}", e);
        }

        self.tracker.close();
        let grace = self.state.settings.shutdown_grace;
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            let live: Vec<(u64, AbortHandle)> = self.connections.lock().drain().collect();
            tracing::warn!(
                "{} sessions still running after {:?}, closing their connections",
                live.len(),
                grace
            );
            for (id, handle) in live {
                tracing::debug!("Aborting session {}", id);
                handle.abort();
            }
            if tokio::time::timeout(FORCE_SHUTDOWN, self.tracker.wait())
                .await
                .is_err()
            {
                tracing::error!("Sessions did not stop within {:?}", FORCE_SHUTDOWN);
            }
        }

        self.shared.close().await?;
        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    connections: Connections,
) {
    let mut next_id: u64 = 0;
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle for {}: {}", peer, e);
        }

        next_id += 1;
        let id = next_id;
        let state = state.clone();
        let registry = connections.clone();

        let mut live = connections.lock();
        let handle = tracker.spawn(async move {
            serve_connection(id, stream, peer, state).await;
            registry.lock().remove(&id);
        });
        live.insert(id, handle.abort_handle());
    }
    tracing::info!("Stopped accepting connections");
}

async fn serve_connection(id: u64, stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) {
    tracing::info!("Session {} accepted from {}", id, peer);
    let (read, write) = stream.into_split();
    let reader = WireReader::with_limit(read, state.settings.max_string_length);
    let writer = WireWriter::new(write);
    // the outcome is logged by the session itself
    let _ = Session::new(id, state, reader, writer).run().await;
}
