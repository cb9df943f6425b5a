//! Duplex stream abstraction consumed by the tunnel session
//!
//! The real implementation wraps a WebSocket connection to the apiserver
//! (see [`crate::kube::transport`]); tests substitute in-process fakes.

use std::future::Future;

use crate::errors::Result;

/// One observation on the inbound side of a duplex stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A complete wire message (channel byte + payload).
    Message(Vec<u8>),
    /// The peer closed the stream normally.
    Closed,
}

/// A bidirectional message stream to one pod/port pair.
///
/// Messages are delivered strictly in order; no reordering or coalescing.
/// `recv` resolves to [`StreamEvent::Closed`] on a normal closure and to a
/// `TransportRead` error on anything else; `send` failures surface as
/// `TransportWrite`.
pub trait FrameStream: Send {
    /// Write one wire message to the stream.
    fn send(&mut self, msg: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next inbound wire message or stream closure.
    fn recv(&mut self) -> impl Future<Output = Result<StreamEvent>> + Send;

    /// Release the stream. Idempotent; errors are ignored.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}
