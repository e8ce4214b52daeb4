// ===============================
// src/channel.rs
// ===============================
//
// Private byte stream between the host and the decision process, one per
// (symbol, timeframe). The host listens, the decision process connects.
//
// Lifecycle: Uninitialized -> Listening -> Connected -> Disconnected.
// Disconnected is terminal and can be re-entered any number of times.
//
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState { Uninitialized, Listening, Connected, Disconnected }

impl SessionState {
    pub fn as_gauge(&self) -> i64 {
        match self {
            SessionState::Uninitialized => 0,
            SessionState::Listening => 1,
            SessionState::Connected => 2,
            SessionState::Disconnected => 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not listening")]
    NotListening,
    #[error("channel is not connected")]
    NotConnected,
    #[error("channel is disconnected")]
    Disconnected,
    #[error("peer closed the stream")]
    PeerClosed,
    #[error("no data from peer after {attempts} timeout(s) of {timeout:?}")]
    Timeout { attempts: u32, timeout: Duration },
    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),
}

/// Session identity: one channel per (symbol, timeframe).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey { pub symbol: String, pub timeframe: String }
impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.timeframe)
    }
}

/// What to do when the peer stays silent longer than the read timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// First elapsed timeout fails the session.
    Fail,
    /// Keep waiting up to `retries` more timeouts, then fail.
    Retry { retries: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    pub on_timeout: TimeoutPolicy,
}

impl Default for ReadPolicy {
    fn default() -> Self { Self { timeout: None, on_timeout: TimeoutPolicy::Fail } }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    /// Directory holding one socket file per session.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    /// `tcp://127.0.0.1:7878` or `unix:///tmp/bridge`.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            return addr.parse().ok().map(Endpoint::Tcp);
        }
        #[cfg(unix)]
        if let Some(dir) = s.strip_prefix("unix://") {
            if dir.is_empty() { return None; }
            return Some(Endpoint::Unix(PathBuf::from(dir)));
        }
        None
    }
}

/// The contract the dispatcher relies on. Reads and writes are complete
/// (exact byte counts) and blocking.
pub trait Channel {
    fn initialize(&mut self) -> Result<(), ChannelError>;
    fn connect(&mut self) -> Result<(), ChannelError>;
    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;
    fn read(&mut self, n: usize) -> Result<Vec<u8>, ChannelError>;
    /// Safe on a never-connected or already-closed channel.
    fn close(&mut self);
    fn state(&self) -> SessionState;
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener, PathBuf),
}

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    fn set_read_timeout(&self, t: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.set_read_timeout(t),
            #[cfg(unix)]
            Stream::Unix(s) => s.set_read_timeout(t),
        }
    }
    fn shutdown(&self) {
        let _ = match self {
            Stream::Tcp(s) => s.shutdown(std::net::Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(std::net::Shutdown::Both),
        };
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}

/// Socket-backed channel (TCP, or Unix-domain socket per session).
pub struct PipeChannel {
    key: ChannelKey,
    endpoint: Endpoint,
    policy: ReadPolicy,
    state: SessionState,
    listener: Option<Listener>,
    stream: Option<Stream>,
}

impl PipeChannel {
    pub fn new(key: ChannelKey, endpoint: Endpoint, policy: ReadPolicy) -> Self {
        Self { key, endpoint, policy, state: SessionState::Uninitialized, listener: None, stream: None }
    }

    pub fn key(&self) -> &ChannelKey { &self.key }

    /// Bound TCP address (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            Some(Listener::Tcp(l)) => l.local_addr().ok(),
            _ => None,
        }
    }

    #[cfg(unix)]
    pub fn socket_path(&self) -> Option<PathBuf> {
        match &self.endpoint {
            Endpoint::Unix(dir) => Some(dir.join(format!("{}_{}.sock", self.key.symbol, self.key.timeframe))),
            _ => None,
        }
    }

    fn stream_mut(&mut self) -> Result<&mut Stream, ChannelError> {
        match self.state {
            SessionState::Disconnected => Err(ChannelError::Disconnected),
            SessionState::Connected => self.stream.as_mut().ok_or(ChannelError::NotConnected),
            _ => Err(ChannelError::NotConnected),
        }
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), ChannelError> {
        let policy = self.policy;
        let stream = self.stream_mut()?;
        let mut filled = 0;
        let mut timeouts = 0u32;
        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(ChannelError::PeerClosed),
                Ok(k) => {
                    filled += k;
                    timeouts = 0;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    timeouts += 1;
                    let timeout = policy.timeout.unwrap_or_default();
                    match policy.on_timeout {
                        TimeoutPolicy::Retry { retries } if timeouts <= retries => {
                            warn!(attempt = timeouts, retries, received = filled, wanted = buf.len(), "read timed out, still waiting");
                        }
                        _ => return Err(ChannelError::Timeout { attempts: timeouts, timeout }),
                    }
                }
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        Ok(())
    }
}

impl Channel for PipeChannel {
    fn initialize(&mut self) -> Result<(), ChannelError> {
        match self.state {
            SessionState::Disconnected => return Err(ChannelError::Disconnected),
            SessionState::Listening | SessionState::Connected => return Ok(()),
            SessionState::Uninitialized => {}
        }
        let listener = match &self.endpoint {
            Endpoint::Tcp(addr) => Listener::Tcp(TcpListener::bind(addr)?),
            #[cfg(unix)]
            Endpoint::Unix(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!("{}_{}.sock", self.key.symbol, self.key.timeframe));
                // stale socket from a previous run
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Listener::Unix(UnixListener::bind(&path)?, path)
            }
        };
        self.listener = Some(listener);
        self.state = SessionState::Listening;
        info!(session = %self.key, "channel initialized");
        Ok(())
    }

    fn connect(&mut self) -> Result<(), ChannelError> {
        if self.state == SessionState::Disconnected {
            return Err(ChannelError::Disconnected);
        }
        let stream = match self.listener.as_ref() {
            Some(Listener::Tcp(l)) => {
                let (s, peer) = l.accept()?;
                s.set_nodelay(true)?;
                debug!(%peer, "tcp peer attached");
                Stream::Tcp(s)
            }
            #[cfg(unix)]
            Some(Listener::Unix(l, _)) => Stream::Unix(l.accept()?.0),
            None => return Err(ChannelError::NotListening),
        };
        stream.set_read_timeout(self.policy.timeout)?;
        self.stream = Some(stream);
        self.state = SessionState::Connected;
        info!(session = %self.key, "channel connected");
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let stream = self.stream_mut()?;
        let mut sent = 0;
        while sent < bytes.len() {
            match stream.write(&bytes[sent..]) {
                Ok(0) => return Err(ChannelError::Io(io::ErrorKind::WriteZero.into())),
                Ok(k) => sent += k,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        stream.flush()?;
        Ok(())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, ChannelError> {
        let mut buf = vec![0u8; n];
        match self.read_into(&mut buf) {
            Ok(()) => Ok(buf),
            Err(e) => {
                if matches!(e, ChannelError::PeerClosed) {
                    self.close();
                }
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        if let Some(s) = self.stream.take() {
            s.shutdown();
        }
        #[cfg(unix)]
        if let Some(Listener::Unix(_, path)) = &self.listener {
            let _ = std::fs::remove_file(path);
        }
        self.listener = None;
        self.state = SessionState::Disconnected;
        info!(session = %self.key, "channel disconnected");
    }

    fn state(&self) -> SessionState { self.state }
}

impl Drop for PipeChannel {
    fn drop(&mut self) { self.close(); }
}
