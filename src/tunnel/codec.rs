//! Frame encoding/decoding for the tunnel wire format
//!
//! Each message on the duplex stream is `[1 byte channel][N bytes payload]`.
//! There is no length prefix; message boundaries come from the underlying
//! transport's own framing.

use crate::errors::{KpulseError, Result};

/// Channel index carrying response/request data.
pub const DATA_CHANNEL: u8 = 0;

/// One decoded wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Whether this frame carries exchange data (channel 0).
    pub fn is_data(&self) -> bool {
        self.channel == DATA_CHANNEL
    }
}

/// Prepend the channel byte to the payload. Total; never fails.
pub fn encode_frame(channel: u8, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(payload.len() + 1);
    msg.push(channel);
    msg.extend_from_slice(payload);
    msg
}

/// Split a wire message into channel byte and payload.
///
/// A message must contain at least the channel byte; an empty message is a
/// protocol violation.
pub fn decode_frame(raw: &[u8]) -> Result<Frame> {
    match raw.split_first() {
        Some((&channel, payload)) => Ok(Frame {
            channel,
            payload: payload.to_vec(),
        }),
        None => Err(KpulseError::MalformedFrame(
            "empty message, missing channel byte".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let encoded = encode_frame(0, b"GET / HTTP/1.1\r\n\r\n");
        let frame = decode_frame(&encoded).unwrap();
        assert_eq!(frame.channel, 0);
        assert_eq!(frame.payload, b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn test_roundtrip_error_channel() {
        let encoded = encode_frame(1, b"connection refused");
        let frame = decode_frame(&encoded).unwrap();
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.payload, b"connection refused");
        assert!(!frame.is_data());
    }

    #[test]
    fn test_decode_empty_message_fails() {
        let result = decode_frame(&[]);
        assert!(matches!(result, Err(KpulseError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_channel_byte_only() {
        // A bare channel byte is a valid frame with an empty payload
        let frame = decode_frame(&[0]).unwrap();
        assert_eq!(frame.channel, 0);
        assert!(frame.payload.is_empty());
        assert!(frame.is_data());
    }

    #[test]
    fn test_encode_empty_payload() {
        assert_eq!(encode_frame(3, b""), vec![3]);
    }
}
