// lib: user-facing TCP connection client for embedded-style applications
// Composes the reference-counted socket handle and the buffered receive
// layer behind a synchronous connect/read/write/stop surface.

// Re-export core types and the error taxonomy
pub use netc_core::*;

// Re-export transport mechanics and the rx buffer
pub use netc_buffer::RxBuffer;
pub use netc_transport::*;

use once_cell::sync::Lazy;
use std::env;
use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};
use tracing::{trace, warn};

// Environment variables for configuration
// NETC_CONNECT_TIMEOUT_MS: default connect timeout (default: 3000)
// NETC_WRITE_RETRY: write retry budget (default: 10)
// NETC_POLL_INTERVAL_MS: write readiness poll window (default: 500)

const DEFAULT_CONNECT_TIMEOUT_MS: i32 = 3000;
const DEFAULT_WRITE_RETRY: u32 = 10;
const DEFAULT_POLL_INTERVAL_MS: i32 = 500;
const WRITE_CHUNK: usize = 1360;
const FLUSH_CHUNK: usize = 1024;

struct ClientConfig {
    connect_timeout_ms: i32,
    write_retry: u32,
    poll_interval_ms: i32,
}

impl ClientConfig {
    fn from_env() -> Self {
        let connect_timeout_ms = env::var("NETC_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);

        let write_retry = env::var("NETC_WRITE_RETRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WRITE_RETRY);

        let poll_interval_ms = env::var("NETC_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        ClientConfig {
            connect_timeout_ms,
            write_retry,
            poll_interval_ms,
        }
    }
}

static CONFIG: Lazy<ClientConfig> = Lazy::new(ClientConfig::from_env);

/// Hostname resolution collaborator.
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str) -> Option<Ipv4Addr>;
}

/// Default resolver backed by the system lookup.
pub struct DnsResolver;

impl Resolver for DnsResolver {
    fn resolve(&self, host: &str) -> Option<Ipv4Addr> {
        (host, 0u16).to_socket_addrs().ok()?.find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
    }
}

/// Synchronous TCP connection client.
///
/// Holds one outbound stream connection. Cloning shares the underlying
/// descriptor and receive buffer: copies alias, they do not clone. The
/// descriptor closes exactly once, when the last sharing client releases it
/// via stop() or drop.
pub struct ConnectionClient {
    handle: Option<Arc<SocketHandle>>,
    rx: Option<Arc<Mutex<RxBuffer>>>,
    state: ConnectionState,
    timeout_ms: i32,
    write_error: bool,
    resolver: Arc<dyn Resolver>,
}

impl ConnectionClient {
    pub fn new() -> Self {
        trace!("ConnectionClient::new");
        ConnectionClient {
            handle: None,
            rx: None,
            state: ConnectionState::Disconnected,
            timeout_ms: CONFIG.connect_timeout_ms,
            write_error: false,
            resolver: Arc::new(DnsResolver),
        }
    }

    /// Client with an injected resolver, for callers that bring their own
    /// name lookup.
    pub fn with_resolver(resolver: Arc<dyn Resolver>) -> Self {
        let mut client = Self::new();
        client.resolver = resolver;
        client
    }

    /// Adopt an already-connected descriptor (e.g. accepted by a listener).
    pub fn from_fd(fd: RawFd) -> Self {
        trace!(fd, "ConnectionClient::from_fd");
        ConnectionClient {
            handle: Some(Arc::new(SocketHandle::new(fd))),
            rx: Some(Arc::new(Mutex::new(RxBuffer::new(fd)))),
            state: ConnectionState::Connected,
            timeout_ms: CONFIG.connect_timeout_ms,
            write_error: false,
            resolver: Arc::new(DnsResolver),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.handle.as_ref().map_or(-1, |h| h.fd())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connect using the client's configured timeout.
    pub fn connect(&mut self, ip: Ipv4Addr, port: u16) -> Result<(), ConnectError> {
        self.connect_timeout(ip, port, self.timeout_ms)
    }

    /// Connect with a timeout override.
    ///
    /// An override <= 0 falls back to the configured default. A negative
    /// configured default is the explicit "wait indefinitely" sentinel and
    /// reaches the readiness wait as-is.
    pub fn connect_timeout(
        &mut self,
        ip: Ipv4Addr,
        port: u16,
        timeout_ms: i32,
    ) -> Result<(), ConnectError> {
        let timeout = if timeout_ms <= 0 {
            self.timeout_ms
        } else {
            timeout_ms
        };
        let fd = open_connection(ip, port, timeout)?;
        self.handle = Some(Arc::new(SocketHandle::new(fd)));
        self.rx = Some(Arc::new(Mutex::new(RxBuffer::new(fd))));
        self.state = ConnectionState::Connected;
        trace!(fd, %ip, port, "connected");
        Ok(())
    }

    /// Resolve a hostname, then connect. Resolution failure aborts before
    /// any socket is opened.
    pub fn connect_host(&mut self, host: &str, port: u16) -> Result<(), ConnectError> {
        self.connect_host_timeout(host, port, self.timeout_ms)
    }

    pub fn connect_host_timeout(
        &mut self,
        host: &str,
        port: u16,
        timeout_ms: i32,
    ) -> Result<(), ConnectError> {
        let resolver = Arc::clone(&self.resolver);
        let ip = resolver
            .resolve(host)
            .ok_or(ConnectError::ResolutionFailed)?;
        self.connect_timeout(ip, port, timeout_ms)
    }

    /// Send `buf`, retrying across partial sends and would-block windows up
    /// to a bounded budget. Returns the bytes actually sent, which may be
    /// fewer than requested; callers must not assume all-or-nothing.
    ///
    /// A call on a disconnected client (or with an empty buffer) records the
    /// write-error condition and returns 0 without blocking.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        if self.fd() < 0 || self.state != ConnectionState::Connected || buf.is_empty() {
            self.write_error = true;
            return 0;
        }
        let fd = self.fd();
        let mut written = 0usize;
        let mut remaining = buf;
        let mut retry = CONFIG.write_retry;
        while retry > 0 {
            retry -= 1;
            match poll_writable(fd, CONFIG.poll_interval_ms) {
                Err(code) => {
                    warn!(code, "write readiness wait failed");
                    return written;
                }
                Ok(false) => continue,
                Ok(true) => {}
            }
            match send_nonblocking(fd, remaining) {
                SendOutcome::Sent(n) => {
                    written += n;
                    if n >= remaining.len() {
                        break;
                    }
                    remaining = &remaining[n..];
                    // partial progress restores the full retry budget
                    retry = CONFIG.write_retry;
                }
                SendOutcome::WouldBlock => {}
                SendOutcome::Fatal(code) => {
                    warn!(code, "send failed");
                    self.write_error = true;
                    self.state = ConnectionState::Disconnected;
                    break;
                }
            }
        }
        written
    }

    pub fn write_byte(&mut self, byte: u8) -> usize {
        self.write(&[byte])
    }

    /// Write the entire contents of a byte source, chunking through an
    /// intermediate buffer and summing the per-chunk results. Stops only
    /// when the source is exhausted; a short per-chunk write does not abort
    /// the loop.
    pub fn write_from<R: Read>(&mut self, source: &mut R) -> usize {
        let mut chunk = vec![0u8; WRITE_CHUNK];
        let mut written = 0usize;
        loop {
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => written += self.write(&chunk[..n]),
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        written
    }

    /// Sticky write-error condition; survives stop() until cleared.
    pub fn write_error(&self) -> bool {
        self.write_error
    }

    pub fn clear_write_error(&mut self) {
        self.write_error = false;
    }

    /// Bytes readable right now, 0 when disconnected.
    pub fn available(&mut self) -> i32 {
        if self.state != ConnectionState::Connected {
            return 0;
        }
        let Some(rx) = self.rx.clone() else {
            return 0;
        };
        let (res, failed) = {
            let mut guard = rx.lock().unwrap();
            (guard.available(), guard.failed())
        };
        if failed {
            self.stop();
        }
        res
    }

    /// Read into `out`, delegating to the bound receive buffer. Returns the
    /// byte count, 0 when nothing is available, -1 when no buffer is bound
    /// or the buffer has failed. A buffer failure conclusively disconnects
    /// the client.
    pub fn read(&mut self, out: &mut [u8]) -> i32 {
        let Some(rx) = self.rx.clone() else {
            return -1;
        };
        let (res, failed) = {
            let mut guard = rx.lock().unwrap();
            (guard.read(out), guard.failed())
        };
        if failed {
            self.stop();
        }
        res
    }

    /// One byte as 0..=255, or -1 when none is available.
    pub fn read_byte(&mut self) -> i32 {
        let mut byte = [0u8; 1];
        let res = self.read(&mut byte);
        if res <= 0 {
            -1
        } else {
            i32::from(byte[0])
        }
    }

    /// Next byte without consuming it, or -1 when none is available.
    pub fn peek(&mut self) -> i32 {
        let Some(rx) = self.rx.clone() else {
            return -1;
        };
        let (res, failed) = {
            let mut guard = rx.lock().unwrap();
            (guard.peek(), guard.failed())
        };
        if failed {
            self.stop();
        }
        res
    }

    /// Discard everything currently pending on the receive side.
    pub fn flush(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let mut scratch = [0u8; FLUSH_CHUNK];
        while self.available() > 0 {
            if self.read(&mut scratch) <= 0 {
                break;
            }
        }
    }

    /// Non-blocking liveness check.
    ///
    /// Probes the descriptor and classifies the outcome. A detected
    /// disconnect flips the state but deliberately keeps the handle and
    /// buffer bound; only stop() or drop releases them.
    pub fn connected(&mut self) -> bool {
        if self.state == ConnectionState::Connected {
            match probe_liveness(self.fd()) {
                ProbeVerdict::Alive => {}
                ProbeVerdict::Dead(code) => {
                    warn!(code, "connection closed by peer");
                    self.state = ConnectionState::Disconnected;
                }
            }
        }
        self.state == ConnectionState::Connected
    }

    /// Release this client's references to the handle and buffer. The
    /// descriptor itself closes only once the last sharing client has
    /// released it.
    pub fn stop(&mut self) {
        trace!("stop()");
        self.state = ConnectionState::Disconnected;
        self.handle = None;
        self.rx = None;
    }

    pub fn remote_ip(&self) -> Ipv4Addr {
        peer_name(self.fd()).0
    }

    pub fn remote_port(&self) -> u16 {
        peer_name(self.fd()).1
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        local_name(self.fd()).0
    }

    pub fn local_port(&self) -> u16 {
        local_name(self.fd()).1
    }

    /// Store the client timeout and re-apply the socket I/O timeouts when a
    /// descriptor is bound.
    pub fn set_timeout(&mut self, timeout_ms: i32) {
        self.timeout_ms = timeout_ms;
        if let Some(handle) = &self.handle {
            set_io_timeout(handle.fd(), timeout_ms);
        }
    }

    pub fn timeout(&self) -> i32 {
        self.timeout_ms
    }
}

impl Default for ConnectionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConnectionClient {
    /// Copies alias the same descriptor and receive buffer; they do not
    /// clone the connection.
    fn clone(&self) -> Self {
        ConnectionClient {
            handle: self.handle.clone(),
            rx: self.rx.clone(),
            state: self.state,
            timeout_ms: self.timeout_ms,
            write_error: self.write_error,
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl std::fmt::Debug for ConnectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionClient")
            .field("fd", &self.fd())
            .field("state", &self.state)
            .field("timeout_ms", &self.timeout_ms)
            .field("write_error", &self.write_error)
            .finish()
    }
}

impl PartialEq for ConnectionClient {
    fn eq(&self, other: &Self) -> bool {
        self.fd() == other.fd() && peer_name(self.fd()) == peer_name(other.fd())
    }
}

impl Drop for ConnectionClient {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoResolver;

    impl Resolver for NoResolver {
        fn resolve(&self, _host: &str) -> Option<Ipv4Addr> {
            None
        }
    }

    #[test]
    fn disconnected_client_defaults() {
        let mut client = ConnectionClient::new();
        assert_eq!(client.fd(), -1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.connected());
        assert_eq!(client.available(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(client.read(&mut buf), -1);
        assert_eq!(client.read_byte(), -1);
        assert_eq!(client.peek(), -1);

        assert_eq!(client.remote_ip(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(client.remote_port(), 0);
        assert_eq!(client.local_ip(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(client.local_port(), 0);
    }

    #[test]
    fn write_on_disconnected_sets_error_flag() {
        let mut client = ConnectionClient::new();
        assert_eq!(client.write(b"ping"), 0);
        assert!(client.write_error());
        client.clear_write_error();
        assert!(!client.write_error());
    }

    #[test]
    fn empty_write_is_an_error() {
        let mut client = ConnectionClient::new();
        assert_eq!(client.write(&[]), 0);
        assert!(client.write_error());
    }

    #[test]
    fn failed_resolution_aborts_without_a_socket() {
        let mut client = ConnectionClient::with_resolver(Arc::new(NoResolver));
        let err = client.connect_host("nowhere.invalid", 80).unwrap_err();
        assert_eq!(err, ConnectError::ResolutionFailed);
        assert_eq!(err.code(), 0);
        assert_eq!(client.fd(), -1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn dns_resolver_handles_literal_addresses() {
        assert_eq!(DnsResolver.resolve("127.0.0.1"), Some(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn set_timeout_is_stored_while_disconnected() {
        let mut client = ConnectionClient::new();
        client.set_timeout(-1);
        assert_eq!(client.timeout(), -1);
    }
}
