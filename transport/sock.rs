// Low-level stream socket primitives - the OS/network boundary
use crate::classify::{classify_probe_errno, classify_send_errno};
use netc_core::{ConnectError, ProbeVerdict, SendOutcome};
use nix::sys::socket::{getsockopt, setsockopt, sockopt};
use nix::sys::time::{TimeVal, TimeValLike};
use std::mem;
use std::net::Ipv4Addr;
use std::os::fd::{BorrowedFd, RawFd};
use tracing::warn;

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn set_nonblocking(fd: RawFd, nonblocking: bool) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return;
        }
        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        libc::fcntl(fd, libc::F_SETFL, flags);
    }
}

/// Wait for the descriptor to become writable.
///
/// A negative timeout waits indefinitely. Ok(true) means writable, Ok(false)
/// means the wait timed out, Err carries the poll errno.
pub fn poll_writable(fd: RawFd, timeout_ms: i32) -> Result<bool, i32> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let res = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if res < 0 {
        return Err(last_errno());
    }
    Ok(res > 0)
}

/// Open, connect and configure a stream socket.
///
/// Runs the non-blocking connect sequence: create the socket, switch it to
/// non-blocking mode, issue the connect, wait for writability bounded by
/// `timeout_ms` (unbounded when negative), then check the pending socket
/// error. On success the socket is returned in blocking mode with I/O
/// timeouts, TCP_NODELAY and SO_KEEPALIVE applied.
pub fn open_connection(ip: Ipv4Addr, port: u16, timeout_ms: i32) -> Result<RawFd, ConnectError> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, libc::IPPROTO_TCP) };
    if fd < 0 {
        return Err(ConnectError::SocketCreate(last_errno()));
    }

    set_nonblocking(fd, true);

    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr.s_addr = u32::from(ip).to_be();

    let res = unsafe {
        libc::connect(
            fd,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if res < 0 {
        let code = last_errno();
        // EINPROGRESS is the expected outcome for a non-blocking connect
        if code != libc::EINPROGRESS {
            warn!(code, "connect rejected");
            close_fd(fd);
            return Err(ConnectError::Rejected(code));
        }
    }

    match poll_writable(fd, timeout_ms) {
        Err(code) => {
            warn!(code, "readiness wait failed");
            close_fd(fd);
            return Err(ConnectError::Poll(code));
        }
        Ok(false) => {
            warn!(timeout_ms, "connect timed out");
            close_fd(fd);
            return Err(ConnectError::Timeout);
        }
        Ok(true) => {}
    }

    let bfd = unsafe { BorrowedFd::borrow_raw(fd) };
    match getsockopt(&bfd, sockopt::SocketError) {
        Ok(0) => {}
        Ok(code) => {
            warn!(code, "pending socket error after connect");
            close_fd(fd);
            return Err(ConnectError::PendingSocketError(code));
        }
        Err(e) => {
            warn!(code = e as i32, "SO_ERROR query failed");
            close_fd(fd);
            return Err(ConnectError::PendingSocketError(e as i32));
        }
    }

    set_nonblocking(fd, false);
    set_io_timeout(fd, timeout_ms);
    let _ = setsockopt(&bfd, sockopt::TcpNoDelay, &true);
    let _ = setsockopt(&bfd, sockopt::KeepAlive, &true);

    Ok(fd)
}

/// Apply SO_RCVTIMEO/SO_SNDTIMEO. Non-positive values leave the socket
/// blocking without a timeout.
pub fn set_io_timeout(fd: RawFd, timeout_ms: i32) {
    if timeout_ms <= 0 {
        return;
    }
    let bfd = unsafe { BorrowedFd::borrow_raw(fd) };
    let tv = TimeVal::milliseconds(timeout_ms as i64);
    let _ = setsockopt(&bfd, sockopt::ReceiveTimeout, &tv);
    let _ = setsockopt(&bfd, sockopt::SendTimeout, &tv);
}

/// One non-blocking send attempt of as much of `buf` as fits.
pub fn send_nonblocking(fd: RawFd, buf: &[u8]) -> SendOutcome {
    let res = unsafe {
        libc::send(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL,
        )
    };
    if res > 0 {
        SendOutcome::Sent(res as usize)
    } else if res == 0 {
        SendOutcome::WouldBlock
    } else {
        classify_send_errno(last_errno())
    }
}

/// Non-blocking liveness probe. Peeks a single byte without consuming it;
/// a zero-length recv would be inert on Linux (it returns 0 before the
/// pending socket error is ever consulted).
///
/// Pending data means alive; an orderly shutdown (0 with nothing pending)
/// means the peer is gone; a failure classifies the errno, failing open on
/// anything unrecognized.
pub fn probe_liveness(fd: RawFd) -> ProbeVerdict {
    let mut scratch = [0u8; 1];
    let res = unsafe {
        libc::recv(
            fd,
            scratch.as_mut_ptr() as *mut libc::c_void,
            1,
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    if res > 0 {
        ProbeVerdict::Alive
    } else if res == 0 {
        ProbeVerdict::Dead(0)
    } else {
        classify_probe_errno(last_errno())
    }
}

fn query_name(fd: RawFd, peer: bool) -> (Ipv4Addr, u16) {
    if fd < 0 {
        return (Ipv4Addr::UNSPECIFIED, 0);
    }
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let sa = &mut addr as *mut libc::sockaddr_in as *mut libc::sockaddr;
    let res = unsafe {
        if peer {
            libc::getpeername(fd, sa, &mut len)
        } else {
            libc::getsockname(fd, sa, &mut len)
        }
    };
    if res < 0 {
        return (Ipv4Addr::UNSPECIFIED, 0);
    }
    (
        Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
        u16::from_be(addr.sin_port),
    )
}

/// Remote endpoint of a connected socket, or 0.0.0.0:0 when unavailable.
pub fn peer_name(fd: RawFd) -> (Ipv4Addr, u16) {
    query_name(fd, true)
}

/// Locally bound endpoint, or 0.0.0.0:0 when unavailable.
pub fn local_name(fd: RawFd) -> (Ipv4Addr, u16) {
    query_name(fd, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    // Bind to an ephemeral port and release it immediately: nothing listens
    // there afterwards, so connects get refused.
    fn reserved_closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[test]
    fn connects_to_loopback_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let fd = open_connection(Ipv4Addr::LOCALHOST, port, 2000).unwrap();
        assert!(fd >= 0);

        let (ip, p) = peer_name(fd);
        assert_eq!(ip, Ipv4Addr::LOCALHOST);
        assert_eq!(p, port);

        let (local_ip, local_port) = local_name(fd);
        assert_eq!(local_ip, Ipv4Addr::LOCALHOST);
        assert_ne!(local_port, 0);

        assert_eq!(poll_writable(fd, 100), Ok(true));
        assert_eq!(probe_liveness(fd), ProbeVerdict::Alive);

        close_fd(fd);
    }

    #[test]
    fn refused_port_is_not_a_timeout() {
        let port = reserved_closed_port();
        let err = open_connection(Ipv4Addr::LOCALHOST, port, 2000).unwrap_err();
        match err {
            ConnectError::PendingSocketError(code) => assert_eq!(code, libc::ECONNREFUSED),
            // Some platforms fail the connect call itself on loopback
            ConnectError::Rejected(_) => {}
            other => panic!("unexpected connect result: {:?}", other),
        }
    }

    #[test]
    fn connect_failure_is_bounded_by_timeout() {
        let port = reserved_closed_port();
        let started = Instant::now();
        let res = open_connection(Ipv4Addr::LOCALHOST, port, 500);
        assert!(res.is_err());
        assert!(
            started.elapsed().as_millis() < 1500,
            "connect did not respect its timeout bound"
        );
    }

    #[test]
    fn probe_sees_orderly_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let fd = open_connection(Ipv4Addr::LOCALHOST, port, 2000).unwrap();
        let (peer, _) = listener.accept().unwrap();
        assert_eq!(probe_liveness(fd), ProbeVerdict::Alive);

        drop(peer);
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(probe_liveness(fd), ProbeVerdict::Dead(0));

        close_fd(fd);
    }

    #[test]
    fn introspection_on_invalid_fd_is_zeroed() {
        assert_eq!(peer_name(-1), (Ipv4Addr::UNSPECIFIED, 0));
        assert_eq!(local_name(-1), (Ipv4Addr::UNSPECIFIED, 0));
    }
}
