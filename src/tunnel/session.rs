//! Tunnel session: one duplex stream, sequential request/response exchanges
//!
//! A session owns the stream for the lifetime of one forwarding attempt. The
//! stream itself lives in a background pump task so that closure is observed
//! even while no exchange is in flight; the session half communicates with
//! the pump over bounded channels and exposes the `exchange` contract.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::assembler::{ResponseAssembler, RESPONSE_DEADLINE};
use super::codec::{encode_frame, DATA_CHANNEL};
use super::stream::{FrameStream, StreamEvent};
use crate::errors::{KpulseError, Result};

const EVENT_BUFFER: usize = 64;

/// One request/response tunnel to a single pod/port pair.
///
/// Exchanges are strictly sequential: the session supports at most one
/// in-flight exchange at a time, so concurrent callers must serialize
/// access (the bridge listener does this with an async mutex).
pub struct TunnelSession {
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    inbound: Option<mpsc::Receiver<Result<StreamEvent>>>,
    dead: CancellationToken,
    pump: Option<JoinHandle<()>>,
    deadline: Duration,
}

impl TunnelSession {
    /// Take ownership of a freshly dialed stream and start the pump.
    pub fn start<S: FrameStream + 'static>(stream: S) -> Self {
        Self::with_deadline(stream, RESPONSE_DEADLINE)
    }

    pub fn with_deadline<S: FrameStream + 'static>(stream: S, deadline: Duration) -> Self {
        let (out_tx, out_rx) = mpsc::channel(EVENT_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(EVENT_BUFFER);
        let dead = CancellationToken::new();
        let pump = tokio::spawn(pump(stream, out_rx, in_tx, dead.clone()));

        Self {
            outbound: Some(out_tx),
            inbound: Some(in_rx),
            dead,
            pump: Some(pump),
            deadline,
        }
    }

    /// Send one request and assemble its response.
    ///
    /// The request is written as a single channel-0 frame; a write failure
    /// aborts immediately and is never retried here. The response is
    /// assembled until complete, the stream closes, or the deadline expires.
    pub async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        let outbound = self.outbound.as_ref().ok_or_else(session_closed)?;
        outbound
            .send(encode_frame(DATA_CHANNEL, request))
            .await
            .map_err(|_| KpulseError::TransportWrite("tunnel stream closed".to_string()))?;

        let inbound = self.inbound.as_mut().ok_or_else(session_closed)?;
        ResponseAssembler::with_deadline(self.deadline)
            .run(inbound)
            .await
    }

    /// Token cancelled once the underlying stream has ended, for any reason.
    pub fn dead_token(&self) -> CancellationToken {
        self.dead.clone()
    }

    /// Whether the underlying stream has already ended.
    pub fn is_dead(&self) -> bool {
        self.dead.is_cancelled()
    }

    /// Release the underlying stream. Idempotent; safe after failures.
    pub async fn close(&mut self) {
        self.outbound.take();
        self.inbound.take();
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
    }
}

fn session_closed() -> KpulseError {
    KpulseError::TransportWrite("session already closed".to_string())
}

/// Owns the stream: forwards queued writes, delivers inbound events, and
/// shuts the stream down when either side finishes.
async fn pump<S: FrameStream>(
    mut stream: S,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    in_tx: mpsc::Sender<Result<StreamEvent>>,
    dead: CancellationToken,
) {
    enum Action {
        Outbound(Vec<u8>),
        CloseRequested,
        Inbound(Result<StreamEvent>),
    }

    loop {
        // The select resolves to a plain action first so the stream is not
        // mutably borrowed while an arm body runs.
        let action = tokio::select! {
            out = out_rx.recv() => match out {
                Some(msg) => Action::Outbound(msg),
                None => Action::CloseRequested,
            },
            event = stream.recv() => Action::Inbound(event),
        };

        match action {
            Action::Outbound(msg) => {
                if let Err(e) = stream.send(msg).await {
                    let _ = in_tx.send(Err(e)).await;
                    stream.shutdown().await;
                    break;
                }
            }
            Action::CloseRequested => {
                stream.shutdown().await;
                break;
            }
            Action::Inbound(event) => {
                let ended = matches!(event, Ok(StreamEvent::Closed) | Err(_));
                if in_tx.send(event).await.is_err() || ended {
                    stream.shutdown().await;
                    break;
                }
            }
        }
    }

    dead.cancel();
}
