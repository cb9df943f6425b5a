//! HTTP response assembly from tunnel frames
//!
//! Consumes the inbound frame sequence of one exchange and decides when a
//! complete response has arrived. Completion is declared as soon as the
//! accumulated bytes contain the header/body separator `\r\n\r\n`, regardless
//! of Content-Length or chunked encoding. This is adequate only for small,
//! single-shot responses; see DESIGN.md for the known gap.

use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::mpsc;
use tracing::debug;

use super::codec::{decode_frame, Frame};
use super::stream::StreamEvent;
use crate::errors::{KpulseError, Result};

/// How long to wait for the next frame before giving up on the response.
pub const RESPONSE_DEADLINE: Duration = Duration::from_secs(5);

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Accumulates channel-0 payloads until the response is complete.
#[derive(Debug)]
pub struct ResponseAssembler {
    buf: BytesMut,
    deadline: Duration,
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::with_deadline(RESPONSE_DEADLINE)
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            buf: BytesMut::new(),
            deadline,
        }
    }

    /// Feed one decoded frame. Returns true once the response is complete.
    ///
    /// Non-data channels carry kubelet diagnostics; their payload is logged
    /// and kept out of the response buffer. An empty channel-0 payload is a
    /// valid no-op.
    pub fn push(&mut self, frame: Frame) -> bool {
        if !frame.is_data() {
            debug!(
                channel = frame.channel,
                payload = %String::from_utf8_lossy(&frame.payload),
                "non-data channel"
            );
            return self.is_complete();
        }

        self.buf.extend_from_slice(&frame.payload);
        self.is_complete()
    }

    /// Whether the buffer already contains the header/body separator.
    pub fn is_complete(&self) -> bool {
        self.buf
            .windows(HEADER_TERMINATOR.len())
            .any(|w| w == HEADER_TERMINATOR)
    }

    /// The assembled response bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Drive assembly against the inbound event stream of one session.
    ///
    /// The deadline is armed on entry and re-armed after every received
    /// event. Expiry before the separator is seen discards the accumulated
    /// bytes and fails the exchange; a normal stream closure ends the
    /// response gracefully.
    pub async fn run(
        mut self,
        events: &mut mpsc::Receiver<Result<StreamEvent>>,
    ) -> Result<Vec<u8>> {
        loop {
            let event = match tokio::time::timeout(self.deadline, events.recv()).await {
                Ok(Some(event)) => event?,
                Ok(None) => {
                    return Err(KpulseError::TransportRead(
                        "tunnel stream ended mid-exchange".to_string(),
                    ))
                }
                Err(_) => return Err(KpulseError::ResponseTimeout(self.deadline.as_secs_f64())),
            };

            match event {
                StreamEvent::Message(raw) => {
                    let frame = decode_frame(&raw)?;
                    if self.push(frame) {
                        return Ok(self.into_bytes());
                    }
                }
                // Graceful short response: the pod finished and closed the
                // stream before we saw the separator.
                StreamEvent::Closed => return Ok(self.into_bytes()),
            }
        }
    }
}
