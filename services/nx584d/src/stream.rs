//! Panel link manager.
//!
//! Wraps the two transports (serial device, raw TCP serial bridge) behind
//! one frame-aware contract and owns connection recovery:
//!
//! - reads are bounded by a per-transport timeout; an idle timeout is not an
//!   error, it just means "no frame this tick";
//! - `read_frame` resynchronizes by discarding bytes until the transport's
//!   start byte, then enforces a mid-frame guard so a stalled peer cannot
//!   wedge the controller;
//! - a lost connection triggers close, sleep, and reconnect with linear
//!   backoff; a write that was lost is re-attempted once after reconnect.
//!
//! The wire protocol (ASCII or binary) is fixed at connect time.

use nx_proto::frame;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Connection target and wire protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ConnectTarget {
    /// A local serial device, e.g. `/dev/ttyUSB0` at 9600 or 38400 baud.
    Serial { device: String, baud: u32 },
    /// A raw TCP serial bridge, `host:port`.
    Tcp { addr: String },
}

impl std::fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectTarget::Serial { device, baud } => write!(f, "{device}@{baud}"),
            ConnectTarget::Tcp { addr } => write!(f, "tcp://{addr}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    Ascii,
    Binary,
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Link timing knobs. Tests shrink these; production uses the defaults.
#[derive(Debug, Clone)]
pub struct StreamTimeouts {
    /// Serial per-read timeout.
    pub serial_read: Duration,
    /// TCP per-read (and connect) timeout.
    pub tcp_read: Duration,
    /// Maximum wall-clock time between the start byte and the end of a
    /// frame before the connection is declared lost.
    pub mid_frame: Duration,
    /// Sleep before the first reconnect attempt; each failed attempt adds
    /// this much again.
    pub reconnect_base: Duration,
    /// Ceiling on the reconnect delay.
    pub reconnect_cap: Duration,
}

impl Default for StreamTimeouts {
    fn default() -> Self {
        StreamTimeouts {
            serial_read: Duration::from_millis(250),
            tcp_read: Duration::from_millis(500),
            mid_frame: Duration::from_secs(60),
            reconnect_base: Duration::from_secs(10),
            reconnect_cap: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No data within the read timeout. Non-fatal: the link is just quiet.
    #[error("read timed out")]
    ReadTimeout,
    /// The current connection is gone; a reconnect cycle is required.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

// ---------------------------------------------------------------------------
// PanelStream
// ---------------------------------------------------------------------------

enum PortHandle {
    Serial(Box<dyn serialport::SerialPort>),
    Tcp(TcpStream),
}

/// A connected panel link. Owns the transport handle, a receive buffer,
/// and the reconnect policy.
pub struct PanelStream {
    target: ConnectTarget,
    protocol: WireProtocol,
    timeouts: StreamTimeouts,
    port: Option<PortHandle>,
    rx: VecDeque<u8>,
}

impl PanelStream {
    /// Connect to the panel with default timeouts.
    pub async fn connect(
        target: ConnectTarget,
        protocol: WireProtocol,
    ) -> std::io::Result<PanelStream> {
        Self::connect_with_timeouts(target, protocol, StreamTimeouts::default()).await
    }

    /// Connect to the panel with explicit timeouts.
    pub async fn connect_with_timeouts(
        target: ConnectTarget,
        protocol: WireProtocol,
        timeouts: StreamTimeouts,
    ) -> std::io::Result<PanelStream> {
        let mut stream = PanelStream {
            target,
            protocol,
            timeouts,
            port: None,
            rx: VecDeque::new(),
        };
        let port = Self::open(
            stream.target.clone(),
            stream.timeouts.serial_read,
            stream.timeouts.tcp_read,
        )
        .await?;
        info!(target = %stream.target, protocol = ?stream.protocol, "panel link connected");
        stream.port = Some(port);
        Ok(stream)
    }

    async fn open(
        target: ConnectTarget,
        serial_read: Duration,
        tcp_read: Duration,
    ) -> std::io::Result<PortHandle> {
        match target {
            ConnectTarget::Serial { device, baud } => {
                let port = serialport::new(device, baud)
                    .timeout(serial_read)
                    .open()
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
                Ok(PortHandle::Serial(port))
            }
            ConnectTarget::Tcp { addr } => {
                let stream = tokio::time::timeout(tcp_read, TcpStream::connect(addr))
                    .await
                    .map_err(|_| {
                        std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
                    })??;
                Ok(PortHandle::Tcp(stream))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Raw reads and writes
    // -----------------------------------------------------------------------

    /// Pull whatever the transport has into the receive buffer, waiting at
    /// most one read timeout.
    async fn fill(&mut self) -> Result<(), StreamError> {
        let Some(port) = self.port.as_mut() else {
            return Err(StreamError::ConnectionLost("no live connection".to_owned()));
        };
        let mut buf = [0u8; 256];
        match port {
            PortHandle::Tcp(stream) => {
                match tokio::time::timeout(self.timeouts.tcp_read, stream.read(&mut buf)).await {
                    Err(_) => Err(StreamError::ReadTimeout),
                    Ok(Ok(0)) => Err(StreamError::ConnectionLost("peer closed".to_owned())),
                    Ok(Ok(n)) => {
                        self.rx.extend(&buf[..n]);
                        Ok(())
                    }
                    Ok(Err(e)) => Err(StreamError::ConnectionLost(e.to_string())),
                }
            }
            PortHandle::Serial(port) => {
                // serialport is a blocking API with its own read timeout;
                // the waits are short (250 ms) so blocking in place keeps
                // the wrapper simple.
                let result = tokio::task::block_in_place(|| port.read(&mut buf));
                match result {
                    Ok(0) => Err(StreamError::ReadTimeout),
                    Ok(n) => {
                        self.rx.extend(&buf[..n]);
                        Ok(())
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                        Err(StreamError::ReadTimeout)
                    }
                    Err(e) => Err(StreamError::ConnectionLost(e.to_string())),
                }
            }
        }
    }

    /// Next buffered byte. With no deadline, an idle read timeout is
    /// surfaced as-is (meaning "no frame"); with a mid-frame deadline,
    /// read timeouts keep waiting until the deadline, which is fatal.
    async fn next_byte(&mut self, deadline: Option<Instant>) -> Result<u8, StreamError> {
        loop {
            if let Some(b) = self.rx.pop_front() {
                return Ok(b);
            }
            match self.fill().await {
                Ok(()) => {}
                Err(StreamError::ReadTimeout) => match deadline {
                    None => return Err(StreamError::ReadTimeout),
                    Some(d) if Instant::now() >= d => {
                        return Err(StreamError::ConnectionLost(
                            "timed out mid-frame".to_owned(),
                        ));
                    }
                    Some(_) => {}
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        let Some(port) = self.port.as_mut() else {
            return Err(StreamError::ConnectionLost("no live connection".to_owned()));
        };
        match port {
            PortHandle::Tcp(stream) => stream
                .write_all(bytes)
                .await
                .map_err(|e| StreamError::ConnectionLost(e.to_string())),
            PortHandle::Serial(port) => tokio::task::block_in_place(|| {
                port.write_all(bytes).and_then(|()| port.flush())
            })
            .map_err(|e| StreamError::ConnectionLost(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Frame-aware API
    // -----------------------------------------------------------------------

    /// One poll for an inbound frame.
    ///
    /// Returns the frame body (length byte through checksum) when one
    /// arrived, or `None` when the link was quiet for one read timeout, a
    /// malformed frame was dropped, or a reconnect cycle ran. The caller's
    /// loop never has to exit for link trouble.
    pub async fn read_frame(&mut self) -> Option<Vec<u8>> {
        match self.read_frame_inner().await {
            Ok(body) => body,
            Err(StreamError::ReadTimeout) => None,
            Err(StreamError::ConnectionLost(reason)) => {
                warn!(%reason, "panel connection lost");
                self.reconnect().await;
                None
            }
        }
    }

    async fn read_frame_inner(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        match self.protocol {
            WireProtocol::Ascii => self.read_frame_ascii().await,
            WireProtocol::Binary => self.read_frame_binary().await,
        }
    }

    async fn sync_to_start(&mut self, start: u8) -> Result<(), StreamError> {
        let mut discarded = 0usize;
        loop {
            let b = self.next_byte(None).await?;
            if b == start {
                if discarded > 0 {
                    warn!(discarded, "discarded bytes before frame start");
                }
                return Ok(());
            }
            discarded += 1;
        }
    }

    async fn read_frame_ascii(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        self.sync_to_start(frame::ASCII_START).await?;
        let deadline = Instant::now() + self.timeouts.mid_frame;
        let mut digits = Vec::new();
        loop {
            let b = self.next_byte(Some(deadline)).await?;
            if b == frame::ASCII_END {
                break;
            }
            digits.push(b);
            // A frame body tops out at 258 bytes; anything bigger is noise.
            if digits.len() > 2 * 260 {
                warn!("oversize ASCII frame dropped");
                return Ok(None);
            }
        }
        match frame::parse_hex(&digits) {
            Ok(body) => Ok(Some(body)),
            Err(e) => {
                warn!(error = %e, "undecodable ASCII frame dropped");
                Ok(None)
            }
        }
    }

    async fn read_frame_binary(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        self.sync_to_start(frame::BINARY_START).await?;
        let deadline = Instant::now() + self.timeouts.mid_frame;
        let length = self.next_body_byte(deadline).await?;
        let mut body = Vec::with_capacity(usize::from(length) + 3);
        body.push(length);
        // The length byte counts type + payload; two checksum bytes follow.
        for _ in 0..usize::from(length) + 2 {
            body.push(self.next_body_byte(deadline).await?);
        }
        Ok(Some(body))
    }

    /// One logical body byte for the binary transport, honoring escapes.
    async fn next_body_byte(&mut self, deadline: Instant) -> Result<u8, StreamError> {
        let b = self.next_byte(Some(deadline)).await?;
        if b == frame::BINARY_START {
            return Err(StreamError::ConnectionLost(
                "unescaped start byte inside frame".to_owned(),
            ));
        }
        if b == frame::ESCAPE {
            let escaped = self.next_byte(Some(deadline)).await?;
            return Ok(escaped ^ frame::ESCAPE_XOR);
        }
        Ok(b)
    }

    /// Encode and send one message (type byte + payload). A connection
    /// loss triggers a reconnect cycle and a single best-effort resend;
    /// a second failure drops the message with a log.
    pub async fn write_frame(&mut self, msg: &[u8]) {
        let encoded = match self.encode(msg) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "unencodable message dropped");
                return;
            }
        };
        if let Err(e) = self.write_raw(&encoded).await {
            warn!(error = %e, "panel connection lost during write");
            self.reconnect().await;
            if let Err(e) = self.write_raw(&encoded).await {
                warn!(error = %e, "resend after reconnect failed; dropping command");
            }
        }
    }

    fn encode(&self, msg: &[u8]) -> Result<Vec<u8>, frame::FrameError> {
        match self.protocol {
            WireProtocol::Ascii => frame::encode_ascii(msg),
            WireProtocol::Binary => frame::encode_binary(msg),
        }
    }

    // -----------------------------------------------------------------------
    // Reconnect policy
    // -----------------------------------------------------------------------

    /// Close the current handle and reconnect: sleep the base delay, try,
    /// and on failure grow the delay linearly up to the cap. Does not
    /// return until a connection is established.
    pub async fn reconnect(&mut self) {
        self.port = None;
        self.rx.clear();
        let mut delay = self.timeouts.reconnect_base;
        loop {
            debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::time::sleep(delay).await;
            match Self::open(
                self.target.clone(),
                self.timeouts.serial_read,
                self.timeouts.tcp_read,
            )
            .await
            {
                Ok(port) => {
                    self.port = Some(port);
                    info!(target = %self.target, "panel link reconnected");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "reconnect attempt failed");
                    delay = (delay + self.timeouts.reconnect_base).min(self.timeouts.reconnect_cap);
                }
            }
        }
    }
}
