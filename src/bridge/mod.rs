//! Local HTTP bridge
//!
//! Accepts local HTTP connections and serializes each one into a tunnel
//! exchange, writing the assembled response bytes back verbatim. Concurrent
//! local connections are queued onto the session's sequential exchange
//! contract; the listener itself never retries a failed exchange.

pub mod http;
pub mod relay;

pub use relay::RawRelay;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{KpulseError, Result};
use crate::tunnel::TunnelSession;

/// HTTP bridge bound to a local port, serving one tunnel session.
pub struct BridgeListener {
    alias: String,
    listener: TcpListener,
}

impl BridgeListener {
    pub async fn bind(alias: &str, local_port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", local_port)).await?;
        Ok(Self {
            alias: alias.to_string(),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve local connections until cancellation or until the session dies.
    ///
    /// Exchange-scoped failures (timeout, malformed frame) drop the local
    /// connection and keep serving; stream-level failures end the listener
    /// with the error so the supervisor can recreate the session. The
    /// session is closed before returning either way.
    pub async fn serve(self, session: TunnelSession, cancel: CancellationToken) -> Result<()> {
        let dead = session.dead_token();
        let session = Arc::new(Mutex::new(session));
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<KpulseError>(1);

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = dead.cancelled() => {
                    break Err(KpulseError::TransportRead(
                        "tunnel stream closed".to_string(),
                    ))
                }
                Some(error) = fatal_rx.recv() => break Err(error),
                accepted = self.listener.accept() => match accepted {
                    Ok((conn, peer)) => {
                        debug!(alias = %self.alias, peer = %peer, "accepted local connection");
                        tokio::spawn(handle_connection(
                            conn,
                            Arc::clone(&session),
                            fatal_tx.clone(),
                            self.alias.clone(),
                        ));
                    }
                    Err(e) => warn!(alias = %self.alias, error = %e, "accept failed"),
                },
            }
        };

        session.lock().await.close().await;
        result
    }
}

async fn handle_connection(
    mut conn: TcpStream,
    session: Arc<Mutex<TunnelSession>>,
    fatal_tx: mpsc::Sender<KpulseError>,
    alias: String,
) {
    let request = match http::read_request(&mut conn).await {
        Ok(bytes) if bytes.is_empty() => return,
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(alias = %alias, error = %e, "failed to read local request");
            return;
        }
    };

    // The mutex is what serializes concurrent local connections onto the
    // session's one-exchange-at-a-time contract.
    let response = {
        let mut session = session.lock().await;
        session.exchange(&request).await
    };

    match response {
        Ok(bytes) => {
            debug!(alias = %alias, bytes = bytes.len(), "writing response to local connection");
            if let Err(e) = conn.write_all(&bytes).await {
                warn!(alias = %alias, error = %e, "failed to write local response");
            }
        }
        Err(e) if e.is_session_fatal() => {
            warn!(alias = %alias, error = %e, "exchange failed, session unusable");
            let _ = fatal_tx.try_send(e);
        }
        Err(e) => {
            warn!(alias = %alias, error = %e, "exchange failed, dropping local connection");
        }
    }
}
