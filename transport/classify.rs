// Platform error code classification
//
// Single translation point from raw platform codes to the abstract taxonomy,
// so the retry and disconnect logic elsewhere stays platform-independent and
// testable with injected codes.
use netc_core::{ProbeVerdict, SendOutcome};

/// Classify the errno observed by a zero-length liveness probe.
///
/// Only codes that conclusively mean "peer is gone" report Dead; everything
/// unrecognized is treated as still alive so noisy platforms never produce
/// false-positive disconnects.
pub fn classify_probe_errno(code: i32) -> ProbeVerdict {
    match code {
        libc::ENOTCONN
        | libc::EPIPE
        | libc::ECONNRESET
        | libc::ECONNREFUSED
        | libc::ECONNABORTED => ProbeVerdict::Dead(code),
        // EWOULDBLOCK/EAGAIN, ENOENT, 0 and anything unknown: still alive
        _ => ProbeVerdict::Alive,
    }
}

/// Classify the errno observed by a failed non-blocking send.
pub fn classify_send_errno(code: i32) -> SendOutcome {
    if code == libc::EAGAIN || code == libc::EWOULDBLOCK {
        SendOutcome::WouldBlock
    } else {
        SendOutcome::Fatal(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_codes_report_dead() {
        for code in [
            libc::ENOTCONN,
            libc::EPIPE,
            libc::ECONNRESET,
            libc::ECONNREFUSED,
            libc::ECONNABORTED,
        ] {
            assert_eq!(classify_probe_errno(code), ProbeVerdict::Dead(code));
        }
    }

    #[test]
    fn benign_codes_report_alive() {
        for code in [0, libc::EAGAIN, libc::EWOULDBLOCK, libc::ENOENT] {
            assert_eq!(classify_probe_errno(code), ProbeVerdict::Alive);
        }
    }

    #[test]
    fn unknown_codes_fail_open() {
        assert_eq!(classify_probe_errno(libc::EINVAL), ProbeVerdict::Alive);
        assert_eq!(classify_probe_errno(9999), ProbeVerdict::Alive);
    }

    #[test]
    fn send_errno_split() {
        assert_eq!(classify_send_errno(libc::EAGAIN), SendOutcome::WouldBlock);
        assert_eq!(
            classify_send_errno(libc::EWOULDBLOCK),
            SendOutcome::WouldBlock
        );
        assert_eq!(
            classify_send_errno(libc::EPIPE),
            SendOutcome::Fatal(libc::EPIPE)
        );
        assert_eq!(
            classify_send_errno(libc::ECONNRESET),
            SendOutcome::Fatal(libc::ECONNRESET)
        );
    }
}
