//! Raw TCP relay for forwards that do not need the HTTP bridge
//!
//! Each accepted local connection gets its own freshly dialed tunnel stream;
//! bytes are copied both ways through channel-0 frames. Non-zero channels
//! carry kubelet diagnostics and are logged, never relayed.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{KpulseError, Result};
use crate::kube::directory::PodTarget;
use crate::kube::transport::TunnelTransport;
use crate::tunnel::{decode_frame, encode_frame, FrameStream, StreamEvent, DATA_CHANNEL};

/// Plain forwarded-port session bound to a local port.
pub struct RawRelay {
    alias: String,
    listener: TcpListener,
}

impl RawRelay {
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

    /// Relay local connections to the target pod until cancellation.
    ///
    /// A failure to dial a tunnel stream ends the relay with the error so
    /// the supervisor can re-resolve the backend; failures on an individual
    /// established connection only end that connection.
    pub async fn serve<T>(
        self,
        transport: Arc<T>,
        target: PodTarget,
        remote_port: u16,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        T: TunnelTransport + 'static,
    {
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<KpulseError>(1);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                Some(error) = fatal_rx.recv() => return Err(error),
                accepted = self.listener.accept() => match accepted {
                    Ok((conn, peer)) => {
                        debug!(alias = %self.alias, peer = %peer, "accepted local connection");
                        tokio::spawn(relay_connection(
                            conn,
                            Arc::clone(&transport),
                            target.clone(),
                            remote_port,
                            cancel.child_token(),
                            fatal_tx.clone(),
                            self.alias.clone(),
                        ));
                    }
                    Err(e) => warn!(alias = %self.alias, error = %e, "accept failed"),
                },
            }
        }
    }
}

async fn relay_connection<T: TunnelTransport>(
    mut conn: TcpStream,
    transport: Arc<T>,
    target: PodTarget,
    remote_port: u16,
    cancel: CancellationToken,
    fatal_tx: mpsc::Sender<KpulseError>,
    alias: String,
) {
    let mut stream = match transport.dial(&target, remote_port).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(alias = %alias, error = %e, "failed to dial tunnel stream");
            let _ = fatal_tx.try_send(e);
            return;
        }
    };

    enum Hop {
        Cancelled,
        Local(std::io::Result<usize>),
        Tunnel(Result<StreamEvent>),
    }

    let mut chunk = vec![0u8; 8192];
    loop {
        // Resolve the select to a plain value first so neither the socket
        // nor the stream stays mutably borrowed in an arm body.
        let hop = tokio::select! {
            _ = cancel.cancelled() => Hop::Cancelled,
            read = conn.read(&mut chunk) => Hop::Local(read),
            event = stream.recv() => Hop::Tunnel(event),
        };

        match hop {
            Hop::Cancelled => break,
            Hop::Local(Ok(0)) => break,
            Hop::Local(Ok(n)) => {
                if let Err(e) = stream.send(encode_frame(DATA_CHANNEL, &chunk[..n])).await {
                    debug!(alias = %alias, error = %e, "tunnel write failed");
                    break;
                }
            }
            Hop::Local(Err(e)) => {
                debug!(alias = %alias, error = %e, "local read failed");
                break;
            }
            Hop::Tunnel(Ok(StreamEvent::Message(raw))) => match decode_frame(&raw) {
                Ok(frame) if frame.is_data() => {
                    if !frame.payload.is_empty()
                        && conn.write_all(&frame.payload).await.is_err()
                    {
                        break;
                    }
                }
                Ok(frame) => debug!(
                    alias = %alias,
                    channel = frame.channel,
                    payload = %String::from_utf8_lossy(&frame.payload),
                    "non-data channel"
                ),
                Err(e) => debug!(alias = %alias, error = %e, "dropping malformed frame"),
            },
            Hop::Tunnel(Ok(StreamEvent::Closed)) => break,
            Hop::Tunnel(Err(e)) => {
                debug!(alias = %alias, error = %e, "tunnel read failed");
                break;
            }
        }
    }

    stream.shutdown().await;
}
