use super::ServerState;
use super::handler::handle_connection;
use crate::scheduler::ConnectionId;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tracing::Instrument;

/// How long open connections may keep talking after the run completes.
/// Workers use it to collect their NO_JOB and say goodbye.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the accept loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Every chunk is Done; open connections are drained.
    Completed,
    /// Stopped from outside (Ctrl-C); open connections are aborted.
    Interrupted,
}

/// Binds `addr` with `SO_REUSEADDR` and the requested listen backlog.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// Accepts connections until `shutdown` resolves, one task per connection.
pub async fn serve<F>(listener: TcpListener, shared: Arc<ServerState>, shutdown: F) -> Shutdown
where
    F: Future<Output = Shutdown>,
{
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();

    let cause = loop {
        tokio::select! {
            cause = &mut shutdown => break cause,

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }

                let id = ConnectionId::new();
                let span = tracing::info_span!("conn", id = %id, peer = %peer);
                connections.spawn(handle_connection(stream, id, shared.clone()).instrument(span));
            }

            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("Connection task failed: {}", e);
                }
            }
        }
    };

    drop(listener);
    tracing::info!(
        "Stopped accepting connections ({:?}), {} still open",
        cause,
        connections.len()
    );

    if cause == Shutdown::Completed {
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!("Drain timed out, aborting {} connections", connections.len());
        }
    }
    connections.shutdown().await;

    cause
}
