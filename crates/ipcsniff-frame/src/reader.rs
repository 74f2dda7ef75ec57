use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use ipcsniff_transport::{is_timeout_kind, IpcStream};

use crate::codec::{Frame, FrameConfig, Header, HEADER_SIZE};
use crate::error::{is_closed_kind, FrameError, Result};

/// Reads complete frames from any `Read` stream.
///
/// Decoding is two-phase: the fixed header is read first and its length is
/// checked against the configured bound before a single payload byte is
/// read. Partial reads are resumed internally, including across read
/// deadlines, so callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    header: [u8; HEADER_SIZE],
    header_filled: usize,
    pending: Option<PendingPayload>,
    config: FrameConfig,
}

struct PendingPayload {
    opcode: u32,
    buf: BytesMut,
    filled: usize,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            header: [0u8; HEADER_SIZE],
            header_filled: 0,
            pending: None,
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached and
    /// `Err(FrameError::Timeout)` when the stream's read deadline elapses;
    /// after a timeout the next call picks up where this one stopped.
    pub fn read_frame(&mut self) -> Result<Frame> {
        if self.pending.is_none() {
            while self.header_filled < HEADER_SIZE {
                let n = read_some(&mut self.inner, &mut self.header[self.header_filled..])?;
                self.header_filled += n;
            }

            let header = Header::parse(&self.header, self.config.max_payload_size)?;
            self.header_filled = 0;

            let mut buf = BytesMut::with_capacity(header.payload_len());
            buf.resize(header.payload_len(), 0);
            self.pending = Some(PendingPayload {
                opcode: header.opcode,
                buf,
                filled: 0,
            });
        }

        if let Some(pending) = self.pending.as_mut() {
            while pending.filled < pending.buf.len() {
                let n = read_some(&mut self.inner, &mut pending.buf[pending.filled..])?;
                pending.filled += n;
            }
        }

        match self.pending.take() {
            Some(pending) => Ok(Frame {
                opcode: pending.opcode,
                payload: pending.buf.freeze(),
            }),
            None => Err(FrameError::ConnectionClosed),
        }
    }

    /// True when a frame has been started but not yet completed.
    pub fn has_partial_frame(&self) -> bool {
        self.header_filled > 0 || self.pending.is_some()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// One read into a non-empty `buf`, retrying on `Interrupted`. Resets
/// and aborts from the peer count as a close.
fn read_some<T: Read>(inner: &mut T, buf: &mut [u8]) -> Result<usize> {
    loop {
        match inner.read(buf) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_timeout_kind(err.kind()) => return Err(FrameError::Timeout),
            Err(err) if is_closed_kind(err.kind()) => return Err(FrameError::ConnectionClosed),
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

impl FrameReader<IpcStream> {
    /// Create a frame reader for `IpcStream` and apply read timeout from config.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

fn transport_to_frame_error(err: ipcsniff_transport::TransportError) -> FrameError {
    match err {
        ipcsniff_transport::TransportError::Io(io)
        | ipcsniff_transport::TransportError::Accept(io) => FrameError::Io(io),
        ipcsniff_transport::TransportError::Bind { source, .. }
        | ipcsniff_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
