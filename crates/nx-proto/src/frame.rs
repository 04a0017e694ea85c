//! Frame body encoding and decoding.
//!
//! A frame body is `length, type|ack, payload..., sum1, sum2`. The length
//! byte covers the message-type byte plus the payload; the checksum covers
//! the length byte plus everything the length counts. On the wire the body
//! is either hex-ASCII between LF and CR, or byte-stuffed binary after a
//! literal `0x7E`.

use std::fmt;

/// ASCII transport frame start (line feed).
pub const ASCII_START: u8 = b'\n';
/// ASCII transport frame end (carriage return).
pub const ASCII_END: u8 = b'\r';
/// Binary transport frame start. Never appears unescaped inside a frame.
pub const BINARY_START: u8 = 0x7E;
/// Binary transport escape introducer.
pub const ESCAPE: u8 = 0x7D;
/// XOR applied to the byte following an escape introducer.
pub const ESCAPE_XOR: u8 = 0x20;

// ---------------------------------------------------------------------------
// Fletcher-16
// ---------------------------------------------------------------------------

/// Fletcher-16 over `data`, low byte first as the panel sends it.
pub fn fletcher(data: &[u8]) -> (u8, u8) {
    let mut s: u32 = 0;
    let mut s2: u32 = 0;
    for &t in data {
        s += u32::from(t);
        s2 += s;
    }
    let modulus = 255;
    let cksum = s % modulus + (modulus + 1) * (s2 % modulus);
    ((cksum & 0xFF) as u8, ((cksum >> 8) & 0xFF) as u8)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame body too short ({0} bytes)")]
    Truncated(usize),
    #[error("checksum mismatch (computed {computed:04X}, received {received:04X})")]
    ChecksumMismatch { computed: u16, received: u16 },
    #[error("message does not fit a one-byte length ({0} bytes)")]
    Oversize(usize),
    #[error("invalid hex digit {0:#04X} in ASCII frame")]
    BadHexDigit(u8),
    #[error("ASCII frame has an odd number of hex digits")]
    OddHexLength,
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A decoded frame: checksum already verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The length byte as received (message-type byte + payload).
    pub length: u8,
    /// Message type with the ack bit masked off.
    pub msgtype: u8,
    /// True when the sender requested a positive ack before processing.
    pub ack_required: bool,
    /// Payload bytes (between the type byte and the checksum).
    pub data: Vec<u8>,
    /// The received checksum, `sum1` in the high byte. Informational only;
    /// verification always recomputes.
    pub checksum: u16,
}

impl Frame {
    /// Decode a full frame body (length byte through checksum bytes),
    /// verifying the Fletcher-16 checksum.
    pub fn decode(raw: &[u8]) -> Result<Frame, FrameError> {
        let n = raw.len();
        if n < 4 {
            return Err(FrameError::Truncated(n));
        }
        let (sum1, sum2) = fletcher(&raw[..n - 2]);
        let received = (u16::from(raw[n - 2]) << 8) | u16::from(raw[n - 1]);
        if (sum1, sum2) != (raw[n - 2], raw[n - 1]) {
            return Err(FrameError::ChecksumMismatch {
                computed: (u16::from(sum1) << 8) | u16::from(sum2),
                received,
            });
        }
        Ok(Frame {
            length: raw[0],
            msgtype: raw[1] & 0x7F,
            ack_required: raw[1] & 0x80 != 0,
            data: raw[2..n - 2].to_vec(),
            checksum: received,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type {} ({} data bytes{})",
            self.msgtype,
            self.data.len(),
            if self.ack_required { ", ack requested" } else { "" }
        )
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Build a frame body from a message (type byte + payload): prepend the
/// length byte and append the checksum.
pub fn encode_body(msg: &[u8]) -> Result<Vec<u8>, FrameError> {
    if msg.is_empty() {
        return Err(FrameError::Truncated(0));
    }
    if msg.len() > 255 {
        return Err(FrameError::Oversize(msg.len()));
    }
    let mut body = Vec::with_capacity(msg.len() + 3);
    body.push(msg.len() as u8);
    body.extend_from_slice(msg);
    let (sum1, sum2) = fletcher(&body);
    body.push(sum1);
    body.push(sum2);
    Ok(body)
}

/// Encode a message for the ASCII transport: LF, uppercase hex body, CR.
pub fn encode_ascii(msg: &[u8]) -> Result<Vec<u8>, FrameError> {
    let body = encode_body(msg)?;
    let mut out = Vec::with_capacity(body.len() * 2 + 2);
    out.push(ASCII_START);
    for b in &body {
        out.extend_from_slice(format!("{b:02X}").as_bytes());
    }
    out.push(ASCII_END);
    Ok(out)
}

/// Encode a message for the binary transport: `0x7E`, then the body with
/// `0x7D`/`0x7E` byte-stuffed. The leading `0x7E` is outside the
/// checksummed region and is never stuffed.
pub fn encode_binary(msg: &[u8]) -> Result<Vec<u8>, FrameError> {
    let body = encode_body(msg)?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(BINARY_START);
    for &b in &body {
        match b {
            ESCAPE | BINARY_START => {
                out.push(ESCAPE);
                out.push(b ^ ESCAPE_XOR);
            }
            _ => out.push(b),
        }
    }
    Ok(out)
}

/// Parse the hex digits of an ASCII frame (everything between LF and CR)
/// into body bytes. Accepts either case.
pub fn parse_hex(digits: &[u8]) -> Result<Vec<u8>, FrameError> {
    if digits.len() % 2 != 0 {
        return Err(FrameError::OddHexLength);
    }
    let nibble = |d: u8| -> Result<u8, FrameError> {
        (d as char)
            .to_digit(16)
            .map(|v| v as u8)
            .ok_or(FrameError::BadHexDigit(d))
    };
    digits
        .chunks_exact(2)
        .map(|pair| Ok(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
