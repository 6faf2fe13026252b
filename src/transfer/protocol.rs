// Protocol - The peer-to-peer transfer wire format
//
// Request:  the filename bytes, sent once, no framing.
// Response: either the sentinel `FILE_NOT_FOUND`, or the file length as
//           decimal ASCII immediately followed by exactly that many bytes.
//
// Neither side frames anything. The listener takes whatever a single read
// returns as the filename, and the client takes the leading digits of its
// first read as the length. A body that begins with ASCII digits and
// arrives in the same read as the length cannot be told apart from it; the
// format is kept as-is for compatibility with deployed peers.

use thiserror::Error;

/// Sent instead of a length when the requested file does not exist
pub const FILE_NOT_FOUND: &[u8] = b"FILE_NOT_FOUND";

/// Default streaming chunk size
pub const CHUNK_SIZE: usize = 8192;

/// Default largest filename request the listener reads
pub const MAX_REQUEST_LEN: usize = 1024;

/// Digits in u64::MAX
const MAX_SIZE_DIGITS: usize = 20;

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid response header: {0}")]
    InvalidHeader(String),

    #[error("Declared size does not fit in 64 bits")]
    SizeOverflow,
}

/// Decoded start of a response
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseHeader {
    /// The sentinel was received
    NotFound,
    /// `total` file bytes follow; the body starts at `body_offset` in the
    /// buffer that was parsed
    Size { total: u64, body_offset: usize },
}

/// Length header for a file of `len` bytes
pub fn encode_size_header(len: u64) -> Vec<u8> {
    len.to_string().into_bytes()
}

/// Whether `buf` is a strict prefix of the sentinel, so more bytes are
/// needed before it can be parsed
pub fn is_partial_sentinel(buf: &[u8]) -> bool {
    !buf.is_empty() && buf.len() < FILE_NOT_FOUND.len() && FILE_NOT_FOUND.starts_with(buf)
}

/// Parse the first bytes of a response
pub fn parse_response_header(buf: &[u8]) -> Result<ResponseHeader, ProtocolError> {
    if buf.starts_with(FILE_NOT_FOUND) {
        return Ok(ResponseHeader::NotFound);
    }

    let digits = buf.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        let preview: String = String::from_utf8_lossy(buf).chars().take(32).collect();
        return Err(ProtocolError::InvalidHeader(format!("expected a length, got {preview:?}")));
    }
    if digits > MAX_SIZE_DIGITS {
        return Err(ProtocolError::SizeOverflow);
    }

    let text = String::from_utf8_lossy(&buf[..digits]);
    let total = text.parse::<u64>().map_err(|_| ProtocolError::SizeOverflow)?;
    Ok(ResponseHeader::Size {
        total,
        body_offset: digits,
    })
}

/// Decode a filename request. Returns `None` for bytes that are not UTF-8.
pub fn decode_request(buf: &[u8]) -> Option<&str> {
    std::str::from_utf8(buf).ok()
}
