// Connect failure taxonomy
//
// connect() reports failures through this enum so tests can tell a refused
// peer from a timeout. Callers that only care about the legacy tri-state
// (1 success / 0 failure / -1 no socket) can collapse it with code().
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("hostname resolution failed")]
    ResolutionFailed,
    #[error("socket creation failed; errno={0}")]
    SocketCreate(i32),
    #[error("connect rejected immediately; errno={0}")]
    Rejected(i32),
    #[error("readiness wait failed; errno={0}")]
    Poll(i32),
    #[error("connect timed out")]
    Timeout,
    #[error("pending socket error; code={0}")]
    PendingSocketError(i32),
}

impl ConnectError {
    /// Legacy tri-state collapse: -1 when no usable socket could even be
    /// opened or the connect call was rejected outright, 0 for everything
    /// else (timeout, refused, resolution failure). Success is 1, expressed
    /// as Ok(()) by the connect APIs.
    pub fn code(&self) -> i32 {
        match self {
            ConnectError::SocketCreate(_) | ConnectError::Rejected(_) => -1,
            _ => 0,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tri_state_collapse() {
        assert_eq!(ConnectError::SocketCreate(24).code(), -1);
        assert_eq!(ConnectError::Rejected(101).code(), -1);
        assert_eq!(ConnectError::ResolutionFailed.code(), 0);
        assert_eq!(ConnectError::Timeout.code(), 0);
        assert_eq!(ConnectError::Poll(4).code(), 0);
        assert_eq!(ConnectError::PendingSocketError(111).code(), 0);
    }

    #[test]
    fn timeout_is_distinguishable() {
        assert!(ConnectError::Timeout.is_timeout());
        assert!(!ConnectError::PendingSocketError(111).is_timeout());
    }
}
