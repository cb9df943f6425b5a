//! Channelized tunnel protocol
//!
//! A Kubernetes port-forward tunnel carries multiplexed sub-streams over one
//! duplex WebSocket connection. Each wire message is tagged with a leading
//! channel-index byte: channel 0 carries data, any non-zero channel carries
//! diagnostic text from the kubelet.

pub mod assembler;
pub mod codec;
pub mod session;
pub mod stream;

pub use assembler::ResponseAssembler;
pub use codec::{decode_frame, encode_frame, Frame, DATA_CHANNEL};
pub use session::TunnelSession;
pub use stream::{FrameStream, StreamEvent};
