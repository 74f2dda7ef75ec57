//! Windows named pipe transport.
//!
//! Named pipe reads cannot be given a deadline directly, so [`PipeStream`]
//! peeks at the pipe on a short interval and only issues a real read once
//! bytes are available. Accepting works the same way: a pending pipe
//! instance is kept in non-blocking connect mode and polled.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};
use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_BROKEN_PIPE, ERROR_NO_DATA, ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED,
    ERROR_PIPE_LISTENING, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{FILE_FLAG_FIRST_PIPE_INSTANCE, PIPE_ACCESS_DUPLEX};
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PeekNamedPipe,
    SetNamedPipeHandleState, WaitNamedPipeW, PIPE_NOWAIT, PIPE_READMODE_BYTE,
    PIPE_REJECT_REMOTE_CLIENTS, PIPE_TYPE_BYTE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
};

use crate::cancel::CancelToken;
use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// Interval between availability checks while waiting for data or a client.
const PEEK_INTERVAL: Duration = Duration::from_millis(5);
/// How long a dial waits for a busy pipe before re-checking cancellation.
const BUSY_WAIT_MS: u32 = 50;
const NO_TIMEOUT: u64 = u64::MAX;

/// One end of a connected named pipe.
pub struct PipeStream {
    file: File,
    closed: Arc<AtomicBool>,
    read_timeout_ms: AtomicU64,
}

impl PipeStream {
    fn new(file: File) -> Self {
        Self {
            file,
            closed: Arc::new(AtomicBool::new(false)),
            read_timeout_ms: AtomicU64::new(NO_TIMEOUT),
        }
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) {
        let millis = timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(NO_TIMEOUT - 1))
            .unwrap_or(NO_TIMEOUT);
        self.read_timeout_ms.store(millis, Ordering::Relaxed);
    }

    pub(crate) fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            closed: Arc::clone(&self.closed),
            read_timeout_ms: AtomicU64::new(self.read_timeout_ms.load(Ordering::Relaxed)),
        })
    }

    pub(crate) fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Bytes ready to read, or `None` once the other end has gone away.
    fn available(&self) -> std::io::Result<Option<u32>> {
        let mut avail = 0u32;
        // SAFETY: the handle is owned by `self.file` and stays open for the call;
        // a null buffer with size 0 only queries the available byte count.
        let ok = unsafe {
            PeekNamedPipe(
                self.file.as_raw_handle() as HANDLE,
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                &mut avail,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            // SAFETY: reads the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            if code == ERROR_BROKEN_PIPE || code == ERROR_NO_DATA {
                return Ok(None);
            }
            return Err(std::io::Error::from_raw_os_error(code as i32));
        }
        Ok(Some(avail))
    }
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let timeout_ms = self.read_timeout_ms.load(Ordering::Relaxed);
        let deadline =
            (timeout_ms != NO_TIMEOUT).then(|| Instant::now() + Duration::from_millis(timeout_ms));

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            match self.available()? {
                None => return Ok(0),
                Some(0) => {}
                Some(avail) => {
                    let n = buf.len().min(avail as usize);
                    return self.file.read(&mut buf[..n]);
                }
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(std::io::Error::from(std::io::ErrorKind::TimedOut));
            }
            std::thread::sleep(PEEK_INTERVAL);
        }
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

/// Server side of a named pipe channel.
pub struct NamedPipeListener {
    path: String,
    wide_path: Vec<u16>,
    buffer_size: u32,
    pending: Mutex<Option<OwnedHandle>>,
}

impl NamedPipeListener {
    /// Create the first instance of the pipe at `path`.
    ///
    /// Fails if another process already serves the same pipe name.
    pub fn bind(path: &str, buffer_size: u32) -> Result<Self> {
        let wide_path = to_wide(path);
        let first = create_instance(&wide_path, buffer_size, true).map_err(|source| {
            TransportError::Bind {
                path: PathBuf::from(path),
                source,
            }
        })?;
        info!(path, "listening on named pipe");
        Ok(Self {
            path: path.to_string(),
            wide_path,
            buffer_size,
            pending: Mutex::new(Some(first)),
        })
    }

    /// Wait up to `timeout` for a client, then hand out the connected instance.
    ///
    /// Returns `Ok(None)` when no client arrived before the deadline.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<IpcStream>> {
        let deadline = Instant::now() + timeout;
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            let handle = match pending.take() {
                Some(handle) => handle,
                None => create_instance(&self.wide_path, self.buffer_size, false)
                    .map_err(TransportError::Accept)?,
            };
            let raw = handle.as_raw_handle() as HANDLE;

            // SAFETY: `raw` is a live pipe instance owned by `handle`; a null
            // OVERLAPPED is valid for a non-overlapped pipe.
            let connected = unsafe { ConnectNamedPipe(raw, std::ptr::null_mut()) } != 0;
            // SAFETY: reads the calling thread's last-error value.
            let code = if connected { 0 } else { unsafe { GetLastError() } };

            if connected || code == ERROR_PIPE_CONNECTED {
                let mode = PIPE_READMODE_BYTE | PIPE_WAIT;
                // SAFETY: `raw` is valid and `mode` outlives the call.
                let ok = unsafe {
                    SetNamedPipeHandleState(raw, &mode, std::ptr::null(), std::ptr::null())
                };
                if ok == 0 {
                    return Err(TransportError::Accept(std::io::Error::last_os_error()));
                }
                debug!(path = %self.path, "accepted named pipe client");
                let file = File::from(handle);
                return Ok(Some(IpcStream::from_pipe(PipeStream::new(file))));
            }

            if code == ERROR_NO_DATA {
                // Client connected and already went away; recycle the instance.
                // SAFETY: `raw` is a valid server-side pipe handle.
                unsafe { DisconnectNamedPipe(raw) };
            } else if code != ERROR_PIPE_LISTENING {
                return Err(TransportError::Accept(std::io::Error::from_raw_os_error(
                    code as i32,
                )));
            }

            *pending = Some(handle);
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(PEEK_INTERVAL);
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "named-pipe"
    }
}

/// Dial a named pipe, retrying while every server instance is busy.
pub fn connect(path: &str, cancel: &CancelToken) -> Result<IpcStream> {
    let wide_path = to_wide(path);
    loop {
        cancel.check()?;
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => {
                debug!(path, "connected to named pipe");
                return Ok(IpcStream::from_pipe(PipeStream::new(file)));
            }
            Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                // SAFETY: `wide_path` is NUL-terminated and outlives the call.
                unsafe { WaitNamedPipeW(wide_path.as_ptr(), BUSY_WAIT_MS) };
            }
            Err(source) => {
                return Err(TransportError::Connect {
                    path: PathBuf::from(path),
                    source,
                })
            }
        }
    }
}

fn create_instance(
    wide_path: &[u16],
    buffer_size: u32,
    first: bool,
) -> std::io::Result<OwnedHandle> {
    let mut open_mode = PIPE_ACCESS_DUPLEX;
    if first {
        open_mode |= FILE_FLAG_FIRST_PIPE_INSTANCE;
    }
    let pipe_mode = PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_NOWAIT | PIPE_REJECT_REMOTE_CLIENTS;

    // SAFETY: `wide_path` is NUL-terminated; null security attributes select
    // the default descriptor.
    let handle = unsafe {
        CreateNamedPipeW(
            wide_path.as_ptr(),
            open_mode,
            pipe_mode,
            PIPE_UNLIMITED_INSTANCES,
            buffer_size,
            buffer_size,
            0,
            std::ptr::null(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `handle` was just returned by CreateNamedPipeW and is owned by no one else.
    Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
}

fn to_wide(path: &str) -> Vec<u16> {
    std::ffi::OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}
