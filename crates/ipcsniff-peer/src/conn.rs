//! Cancellable message connections.
//!
//! The channel's read primitive blocks and cannot be interrupted, so every
//! read is bounded by a short poll deadline. A deadline expiry is reported
//! as [`PeerError::Timeout`] by [`Connection::try_read`] and silently
//! retried by [`Connection::read`], which re-checks the cancellation token
//! and the closed flag between attempts. Worst-case cancellation latency is
//! therefore about one poll interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ipcsniff_frame::{Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use ipcsniff_transport::{CancelToken, IpcStream};
use tracing::debug;

use crate::error::{PeerError, Result};

/// Default bound on a single read attempt.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings shared by every connection a dialer or listener produces.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Read deadline per poll attempt.
    pub poll_interval: Duration,
    /// Largest accepted payload, in either direction.
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_message_size: ipcsniff_frame::DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ConnectionConfig {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_message_size,
            read_timeout: Some(self.poll_interval),
        }
    }
}

/// An open duplex channel to exactly one peer.
pub struct Connection {
    instance_id: u32,
    reader: ConnectionReader,
    writer: ConnectionWriter,
    closer: CloseHandle,
}

impl Connection {
    /// Wrap a connected stream.
    ///
    /// `instance_id` records which channel the stream belongs to; it is only
    /// used for identification.
    pub fn from_stream(
        stream: IpcStream,
        instance_id: u32,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        let frame_config = config.frame_config();
        let reader_stream = stream.try_clone()?;
        let closer_stream = stream.try_clone()?;

        let closed = Arc::new(AtomicBool::new(false));
        let reader = FrameReader::with_config_ipc(reader_stream, frame_config.clone())?;
        let writer = FrameWriter::with_config(stream, frame_config);

        Ok(Self {
            instance_id,
            reader: ConnectionReader {
                reader,
                closed: Arc::clone(&closed),
                poll_interval: config.poll_interval,
            },
            writer: ConnectionWriter {
                writer,
                closed: Arc::clone(&closed),
            },
            closer: CloseHandle {
                stream: Arc::new(closer_stream),
                closed,
            },
        })
    }

    /// Instance id of the channel this connection was opened on.
    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Read the next frame, polling until one arrives.
    pub fn read(&mut self, cancel: &CancelToken) -> Result<Frame> {
        self.reader.read(cancel)
    }

    /// One poll-deadline read attempt; `Err(PeerError::Timeout)` means no data yet.
    pub fn try_read(&mut self) -> Result<Frame> {
        self.reader.try_read()
    }

    /// Encode and write one frame in full.
    pub fn write(&mut self, cancel: &CancelToken, opcode: u32, payload: &[u8]) -> Result<()> {
        self.writer.write(cancel, opcode, payload)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.closer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Credentials of the peer process, where the platform exposes them.
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        self.closer.stream.peer_credentials()
    }

    /// Split into independently owned halves.
    ///
    /// The reader and writer can move to different threads; the close handle
    /// tears down both.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter, CloseHandle) {
        (self.reader, self.writer, self.closer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("instance_id", &self.instance_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read half of a [`Connection`].
pub struct ConnectionReader {
    reader: FrameReader<IpcStream>,
    closed: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ConnectionReader {
    /// Read the next frame, polling until one arrives.
    ///
    /// Fails with `Cancelled` once `cancel` fires and with `Closed` once the
    /// connection is closed from either end. Each check happens at least
    /// once per poll interval.
    pub fn read(&mut self, cancel: &CancelToken) -> Result<Frame> {
        loop {
            if cancel.is_cancelled() {
                return Err(PeerError::Cancelled);
            }
            match self.try_read() {
                Err(PeerError::Timeout(_)) => continue,
                other => return other,
            }
        }
    }

    /// One poll-deadline read attempt.
    pub fn try_read(&mut self) -> Result<Frame> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PeerError::Closed);
        }
        match self.reader.read_frame() {
            Ok(frame) => Ok(frame),
            Err(FrameError::Timeout) => Err(PeerError::Timeout(self.poll_interval)),
            // A locally closed stream reports EOF or a reset; both mean Closed.
            Err(_) if self.closed.load(Ordering::SeqCst) => Err(PeerError::Closed),
            Err(err) => Err(err.into()),
        }
    }
}

/// Write half of a [`Connection`].
pub struct ConnectionWriter {
    writer: FrameWriter<IpcStream>,
    closed: Arc<AtomicBool>,
}

impl ConnectionWriter {
    /// Encode and write one frame in full.
    ///
    /// Writes are not polled; they are expected to complete promptly
    /// relative to the poll interval.
    pub fn write(&mut self, cancel: &CancelToken, opcode: u32, payload: &[u8]) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(PeerError::Cancelled);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(PeerError::Closed);
        }
        match self.writer.send(opcode, payload) {
            Ok(()) => Ok(()),
            Err(FrameError::PayloadTooLarge { size, max }) => {
                Err(PeerError::FrameTooLarge { size, max })
            }
            Err(_) if self.closed.load(Ordering::SeqCst) => Err(PeerError::Closed),
            Err(err) => Err(err.into()),
        }
    }
}

/// Cloneable, idempotent closer for a [`Connection`].
#[derive(Clone)]
pub struct CloseHandle {
    stream: Arc<IpcStream>,
    closed: Arc<AtomicBool>,
}

impl CloseHandle {
    /// Close the connection.
    ///
    /// Safe to call from any thread and any number of times. A read blocked
    /// on this connection returns `Closed` within one poll interval.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.stream.shutdown() {
            debug!(error = %err, "stream shutdown failed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::time::Instant;

    use ipcsniff_frame::{FRAME, HANDSHAKE, PING};

    use super::*;

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            poll_interval: Duration::from_millis(50),
            max_message_size: 1024,
        }
    }

    fn pair() -> (Connection, Connection) {
        let (left, right) = IpcStream::pair().unwrap();
        (
            Connection::from_stream(left, 0, &test_config()).unwrap(),
            Connection::from_stream(right, 0, &test_config()).unwrap(),
        )
    }

    #[test]
    fn write_then_read_preserves_frame() {
        let (mut left, mut right) = pair();
        let cancel = CancelToken::new();

        left.write(&cancel, HANDSHAKE, br#"{"v":"1","client_id":"1"}"#)
            .unwrap();
        left.write(&cancel, FRAME, b"ping").unwrap();

        let f1 = right.read(&cancel).unwrap();
        let f2 = right.read(&cancel).unwrap();
        assert_eq!(f1.opcode, HANDSHAKE);
        assert_eq!((f2.opcode, f2.payload.as_ref()), (FRAME, b"ping".as_ref()));
    }

    #[test]
    fn try_read_without_data_times_out() {
        let (_left, mut right) = pair();
        let err = right.try_read().unwrap_err();
        assert!(matches!(err, PeerError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(!err.is_terminal());
    }

    #[test]
    fn read_observes_cancellation_within_one_interval() {
        let (_left, right) = pair();
        let cancel = CancelToken::new();
        let (mut reader, _writer, _closer) = right.into_split();

        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            let result = reader.read(&remote);
            (result, start.elapsed())
        });

        std::thread::sleep(Duration::from_millis(20));
        let cancelled_at = Instant::now();
        cancel.cancel();

        let (result, _) = handle.join().unwrap();
        assert!(matches!(result, Err(PeerError::Cancelled)));
        assert!(cancelled_at.elapsed() <= Duration::from_millis(200));
    }

    #[test]
    fn close_unblocks_reader_and_is_idempotent() {
        let (_left, right) = pair();
        let (mut reader, _writer, closer) = right.into_split();

        let handle = std::thread::spawn(move || reader.read(&CancelToken::new()));

        std::thread::sleep(Duration::from_millis(20));
        let closed_at = Instant::now();
        closer.close();
        closer.clone().close();

        assert!(matches!(handle.join().unwrap(), Err(PeerError::Closed)));
        assert!(closed_at.elapsed() <= Duration::from_millis(200));
        assert!(closer.is_closed());
    }

    #[test]
    fn peer_close_reports_closed() {
        let (left, mut right) = pair();
        left.close();
        drop(left);
        assert!(matches!(
            right.read(&CancelToken::new()),
            Err(PeerError::Closed)
        ));
    }

    #[test]
    fn peer_dropping_unread_data_reports_closed() {
        let (mut left, right) = pair();
        left.write(&CancelToken::new(), FRAME, b"never read").unwrap();
        drop(right);

        let err = left.read(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, PeerError::Closed), "{err:?}");
        assert!(err.is_shutdown());
    }

    #[test]
    fn write_after_close_fails_closed() {
        let (mut left, _right) = pair();
        left.close();
        assert!(matches!(
            left.write(&CancelToken::new(), PING, b""),
            Err(PeerError::Closed)
        ));
    }

    #[test]
    fn oversized_write_rejected() {
        let (mut left, _right) = pair();
        let err = left
            .write(&CancelToken::new(), FRAME, &[0u8; 1025])
            .unwrap_err();
        assert!(matches!(
            err,
            PeerError::FrameTooLarge {
                size: 1025,
                max: 1024
            }
        ));
    }

    #[test]
    fn oversized_header_fails_frame_too_large() {
        let (mut raw, remote) = IpcStream::pair().unwrap();
        let mut conn = Connection::from_stream(remote, 0, &test_config()).unwrap();

        raw.write_all(&FRAME.to_le_bytes()).unwrap();
        raw.write_all(&1025u32.to_le_bytes()).unwrap();

        let err = conn.read(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, PeerError::FrameTooLarge { size: 1025, .. }));
    }
}
