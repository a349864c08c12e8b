// Core types shared across the netc crates
use std::fmt;

/// Connection state of a single client instance. There is no retained
/// "connecting" state: connect() is synchronous and either succeeds or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
        }
    }
}

/// Result of classifying a non-blocking liveness probe.
///
/// Unrecognized platform codes map to Alive (fail-open) so noisy platforms
/// never produce false-positive disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Alive,
    /// Peer is gone; carries the raw platform code for diagnostics.
    Dead(i32),
}

/// Result of one non-blocking send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// That many bytes left the transport (may be fewer than requested).
    Sent(usize),
    /// Transient: no buffer space right now, retry later.
    WouldBlock,
    /// Transport-level failure; carries the raw platform code.
    Fatal(i32),
}
