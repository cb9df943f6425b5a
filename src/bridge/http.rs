//! Local HTTP request capture
//!
//! The bridge passes request bytes through the tunnel exactly as received;
//! this module only decides where one request ends: headers through the
//! `\r\n\r\n` separator, plus a Content-Length body when one is declared.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::errors::{KpulseError, Result};

const MAX_REQUEST_BYTES: usize = 1024 * 1024;
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Read one HTTP/1.x request and return its exact wire bytes.
///
/// Returns an empty buffer when the peer closes without sending anything.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    loop {
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(KpulseError::Argument(
                "local request exceeds 1 MiB".to_string(),
            ));
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            // Peer closed; hand back whatever arrived
            return Ok(buf);
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(header_end) = find_terminator(&buf) {
            let body_start = header_end + HEADER_TERMINATOR.len();
            let body_len = content_length(&buf[..header_end]).unwrap_or(0);
            if buf.len() >= body_start + body_len {
                return Ok(buf);
            }
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

fn content_length(headers: &[u8]) -> Option<usize> {
    for line in headers.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let (name, value) = line.split_at(colon);
        if name.eq_ignore_ascii_case(b"content-length") {
            return std::str::from_utf8(&value[1..]).ok()?.trim().parse().ok();
        }
    }
    None
}
