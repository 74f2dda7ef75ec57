//! One client paired with one freshly dialed origin connection.
//!
//! A bridge runs three threads under one cancellation scope: a relay per
//! direction and a closer. Whichever relay ends first cancels the scope; the
//! closer then closes both connections, which unblocks the other relay
//! within one poll interval. [`Bridge::run`] returns only after all three
//! threads have finished.

use std::sync::Arc;
use std::thread;

use ipcsniff_frame::{Frame, FRAME, HANDSHAKE};
use ipcsniff_peer::{
    Connection, ConnectionReader, ConnectionWriter, DialTarget, Dialer, EventHandler,
    EventPacket, HandshakePacket, PROBE_INSTANCE_IDS,
};
use ipcsniff_transport::CancelToken;
use tracing::{debug, error, info, warn};

use crate::error::{Direction, ProxyError, Result};

/// Relays traffic between one client and the origin.
pub struct Bridge {
    conn_id: u64,
    dialer: Dialer,
    handler: Arc<dyn EventHandler>,
}

impl Bridge {
    pub fn new(conn_id: u64, dialer: Dialer, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            conn_id,
            dialer,
            handler,
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Dial the origin and relay until either side ends or `parent` fires.
    ///
    /// Shutdown (cancellation or either side closing) is not an error. When
    /// the origin cannot be dialed the client is closed and
    /// [`ProxyError::DialFailed`] returned.
    pub fn run(self, client: Connection, parent: &CancelToken) -> Result<()> {
        let conn = self.conn_id;
        let scope = parent.child_token();

        let origin = match self.dialer.dial(&scope) {
            Ok(origin) => origin,
            Err(source) => {
                client.close();
                let instance_id = match self.dialer.options().target {
                    DialTarget::Fixed(id) => id,
                    // Probing reports the error of the last id tried.
                    DialTarget::Probe => PROBE_INSTANCE_IDS[PROBE_INSTANCE_IDS.len() - 1],
                };
                warn!(conn, instance_id, error = %source, "failed to open connection to origin");
                return Err(ProxyError::DialFailed {
                    instance_id,
                    source,
                });
            }
        };
        debug!(conn, origin = origin.instance_id(), "origin connected");

        let (client_reader, client_writer, client_closer) = client.into_split();
        let (origin_reader, origin_writer, origin_closer) = origin.into_split();

        let relay = Relay {
            conn,
            scope: &scope,
            handler: self.handler.as_ref(),
        };

        let (sent, received) = thread::scope(|s| {
            let send = s.spawn(|| relay.run(Direction::Send, client_reader, origin_writer));
            let receive =
                s.spawn(|| relay.run(Direction::Receive, origin_reader, client_writer));
            s.spawn(|| {
                scope.wait();
                origin_closer.close();
                client_closer.close();
            });

            (join(send), join(receive))
        });

        match (sent, received) {
            (Err(err), _) | (Ok(()), Err(err)) => {
                error!(conn, error = %err, "bridge failed");
                Err(err)
            }
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("conn_id", &self.conn_id)
            .field("dialer", &self.dialer)
            .finish()
    }
}

fn join(handle: thread::ScopedJoinHandle<'_, Result<()>>) -> Result<()> {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

struct Relay<'a> {
    conn: u64,
    scope: &'a CancelToken,
    handler: &'a dyn EventHandler,
}

impl Relay<'_> {
    fn run(
        &self,
        direction: Direction,
        mut from: ConnectionReader,
        mut to: ConnectionWriter,
    ) -> Result<()> {
        let _cancel = CancelOnDrop(self.scope);

        loop {
            let frame = match from.read(self.scope) {
                Ok(frame) => frame,
                Err(err) if err.is_shutdown() => {
                    debug!(conn = self.conn, %direction, reason = %err, "relay stopped");
                    return Ok(());
                }
                Err(source) => return Err(ProxyError::Relay { direction, source }),
            };

            self.observe(direction, &frame);

            match to.write(self.scope, frame.opcode, &frame.payload) {
                Ok(()) => {}
                // The closer got there first; the scope already explains it.
                Err(err) if err.is_shutdown() && self.scope.is_cancelled() => return Ok(()),
                Err(source) => return Err(ProxyError::Relay { direction, source }),
            }
        }
    }

    fn observe(&self, direction: Direction, frame: &Frame) {
        info!(
            conn = self.conn,
            %direction,
            opcode = frame.opcode,
            name = frame.opcode_name(),
            size = frame.payload.len(),
            data = %String::from_utf8_lossy(&frame.payload),
            "relayed message"
        );

        match frame.opcode {
            HANDSHAKE => {
                if let Ok(handshake) = HandshakePacket::from_payload(&frame.payload) {
                    debug!(
                        conn = self.conn,
                        version = %handshake.v,
                        client_id = %handshake.client_id,
                        "handshake"
                    );
                }
            }
            FRAME => {
                if let Some((event_type, data)) = decode_event(&frame.payload) {
                    self.handler.on_event(&event_type, &data);
                }
            }
            _ => {}
        }
    }
}

fn decode_event(payload: &[u8]) -> Option<(String, Vec<u8>)> {
    let packet = EventPacket::from_payload(payload).ok()?;
    let data = packet.raw_data().ok()?;
    let event_type = packet.event_type()?.to_string();
    Some((event_type, data))
}

/// Cancels the bridge scope however a relay exits, panics included.
struct CancelOnDrop<'a>(&'a CancelToken);

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use ipcsniff_frame::{CLOSE, PING};
    use ipcsniff_peer::{ConnectionConfig, DialOptions, Listener, NoopHandler, PeerError};
    use ipcsniff_transport::{ChannelConfig, IpcStream};

    use super::*;

    const POLL: Duration = Duration::from_millis(50);

    fn runtime_dir(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/ipcsniff-b-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            poll_interval: POLL,
            max_message_size: 1024,
        }
    }

    fn origin_listener(dir: &std::path::Path, id: u32) -> Listener {
        let channel = ChannelConfig {
            runtime_dir: Some(dir.to_path_buf()),
            ..ChannelConfig::default()
        };
        Listener::listen(id, &channel, config()).expect("origin should bind")
    }

    fn dialer(dir: &std::path::Path, id: u32) -> Dialer {
        Dialer::new(
            DialOptions::fixed(id)
                .with_runtime_dir(dir)
                .with_connection_config(config()),
        )
    }

    /// Client-side pair: the bridge gets one end, the test drives the other.
    fn client_pair() -> (Connection, Connection) {
        let (a, b) = IpcStream::pair().unwrap();
        (
            Connection::from_stream(a, 0, &config()).unwrap(),
            Connection::from_stream(b, 0, &config()).unwrap(),
        )
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Vec<u8>)>>);

    impl EventHandler for Recorder {
        fn on_event(&self, event_type: &str, data: &[u8]) {
            self.0
                .lock()
                .unwrap()
                .push((event_type.to_string(), data.to_vec()));
        }
    }

    #[test]
    fn relays_frames_in_order_both_ways() {
        let dir = runtime_dir("relay");
        let origin_listener = origin_listener(&dir, 2);
        let (bridge_side, mut client) = client_pair();
        let recorder = Arc::new(Recorder::default());
        let token = CancelToken::new();

        let bridge = Bridge::new(1, dialer(&dir, 2), recorder.clone());
        let bridge_token = token.clone();
        let handle = thread::spawn(move || bridge.run(bridge_side, &bridge_token));

        let mut origin = origin_listener.accept().expect("bridge should dial origin");
        let cancel = CancelToken::new();

        let sent: Vec<(u32, Vec<u8>)> = vec![
            (HANDSHAKE, br#"{"v":"1","client_id":"7"}"#.to_vec()),
            (FRAME, b"one".to_vec()),
            (FRAME, Vec::new()),
            (99, vec![0xff, 0x00, 0x7f]),
            (FRAME, b"three".to_vec()),
        ];
        for (opcode, payload) in &sent {
            client.write(&cancel, *opcode, payload).unwrap();
        }
        for (opcode, payload) in &sent {
            let frame = origin.read(&cancel).unwrap();
            assert_eq!(frame.opcode, *opcode);
            assert_eq!(frame.payload.as_ref(), payload.as_slice());
        }

        let ready = br#"{"cmd":"DISPATCH","evt":"READY","data":{"v":1}}"#;
        origin.write(&cancel, FRAME, ready).unwrap();
        origin.write(&cancel, PING, b"p").unwrap();
        let first = client.read(&cancel).unwrap();
        let second = client.read(&cancel).unwrap();
        assert_eq!(first.payload.as_ref(), ready);
        assert_eq!((second.opcode, second.payload.as_ref()), (PING, b"p".as_ref()));

        token.cancel();
        assert!(handle.join().unwrap().is_ok());
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![("READY".to_string(), br#"{"v":1}"#.to_vec())]
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cancellation_closes_both_sides_within_bound() {
        let dir = runtime_dir("cancel");
        let origin_listener = origin_listener(&dir, 3);
        let (bridge_side, mut client) = client_pair();
        let token = CancelToken::new();

        let bridge = Bridge::new(2, dialer(&dir, 3), Arc::new(NoopHandler));
        let bridge_token = token.clone();
        let handle = thread::spawn(move || bridge.run(bridge_side, &bridge_token));
        let mut origin = origin_listener.accept().unwrap();

        thread::sleep(Duration::from_millis(20));
        let cancelled_at = Instant::now();
        token.cancel();
        assert!(handle.join().unwrap().is_ok());
        assert!(cancelled_at.elapsed() <= Duration::from_millis(200));

        let fresh = CancelToken::new();
        assert!(matches!(client.read(&fresh), Err(PeerError::Closed)));
        assert!(matches!(origin.read(&fresh), Err(PeerError::Closed)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn client_close_tears_down_origin() {
        let dir = runtime_dir("close");
        let origin_listener = origin_listener(&dir, 4);
        let (bridge_side, client) = client_pair();

        let bridge = Bridge::new(3, dialer(&dir, 4), Arc::new(NoopHandler));
        let handle = thread::spawn(move || bridge.run(bridge_side, &CancelToken::new()));
        let mut origin = origin_listener.accept().unwrap();

        client.close();
        assert!(handle.join().unwrap().is_ok());
        assert!(matches!(
            origin.read(&CancelToken::new()),
            Err(PeerError::Closed)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn dial_failure_closes_client() {
        let dir = runtime_dir("dial");
        let (bridge_side, mut client) = client_pair();

        let bridge = Bridge::new(4, dialer(&dir, 5), Arc::new(NoopHandler));
        let err = bridge.run(bridge_side, &CancelToken::new()).unwrap_err();

        assert!(matches!(err, ProxyError::DialFailed { instance_id: 5, .. }));
        assert!(matches!(
            client.read(&CancelToken::new()),
            Err(PeerError::Closed)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn oversized_frame_ends_bridge_without_forwarding() {
        let dir = runtime_dir("oversized");
        let origin_listener = origin_listener(&dir, 6);
        let (mut raw, bridge_stream) = IpcStream::pair().unwrap();
        let bridge_side = Connection::from_stream(bridge_stream, 0, &config()).unwrap();

        let bridge = Bridge::new(5, dialer(&dir, 6), Arc::new(NoopHandler));
        let handle = thread::spawn(move || bridge.run(bridge_side, &CancelToken::new()));
        let mut origin = origin_listener.accept().unwrap();

        raw.write_all(&FRAME.to_le_bytes()).unwrap();
        raw.write_all(&1025u32.to_le_bytes()).unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Relay {
                direction: Direction::Send,
                source: PeerError::FrameTooLarge { size: 1025, .. }
            }
        ));
        assert!(matches!(
            origin.read(&CancelToken::new()),
            Err(PeerError::Closed)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn close_opcode_is_forwarded_like_any_frame() {
        let dir = runtime_dir("closeop");
        let origin_listener = origin_listener(&dir, 7);
        let (bridge_side, mut client) = client_pair();
        let token = CancelToken::new();

        let bridge = Bridge::new(6, dialer(&dir, 7), Arc::new(NoopHandler));
        let bridge_token = token.clone();
        let handle = thread::spawn(move || bridge.run(bridge_side, &bridge_token));
        let mut origin = origin_listener.accept().unwrap();

        client
            .write(&CancelToken::new(), CLOSE, br#"{"code":1000}"#)
            .unwrap();
        let frame = origin.read(&CancelToken::new()).unwrap();
        assert_eq!(frame.opcode, CLOSE);

        token.cancel();
        assert!(handle.join().unwrap().is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn client_leaving_with_unread_frame_is_a_clean_close() {
        let dir = runtime_dir("unread");
        let origin_listener = origin_listener(&dir, 8);
        let (bridge_side, client) = client_pair();

        let bridge = Bridge::new(7, dialer(&dir, 8), Arc::new(NoopHandler));
        let handle = thread::spawn(move || bridge.run(bridge_side, &CancelToken::new()));
        let mut origin = origin_listener.accept().unwrap();

        origin
            .write(&CancelToken::new(), FRAME, br#"{"evt":"READY","data":{}}"#)
            .unwrap();
        // Let the relayed frame land in the client's receive queue.
        thread::sleep(POLL * 2);
        drop(client);

        assert!(handle.join().unwrap().is_ok());
        assert!(matches!(
            origin.read(&CancelToken::new()),
            Err(PeerError::Closed)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
