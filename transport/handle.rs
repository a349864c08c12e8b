// Reference-counted socket handle with close-exactly-once semantics
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use tracing::trace;

/// Owns one raw stream socket descriptor and closes it when dropped.
///
/// Clients share a handle as `Arc<SocketHandle>`; the descriptor is released
/// the instant the last owner drops its reference, no matter which client
/// releases first. The close outcome is best-effort and never escalated.
pub struct SocketHandle {
    fd: RawFd,
}

impl SocketHandle {
    /// Takes ownership of an already-open descriptor.
    pub fn new(fd: RawFd) -> Self {
        trace!(fd, "SocketHandle::new");
        SocketHandle { fd }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl AsRawFd for SocketHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl AsFd for SocketHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // Safe: self owns fd and keeps it open for its whole lifetime
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        trace!(fd = self.fd, "closing socket");
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::IntoRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    fn send_probe(fd: RawFd) -> isize {
        let byte = [0u8; 1];
        unsafe {
            libc::send(
                fd,
                byte.as_ptr() as *const libc::c_void,
                1,
                libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL,
            )
        }
    }

    #[test]
    fn descriptor_survives_until_last_owner_drops() {
        let (a, b) = UnixStream::pair().unwrap();
        let fd = a.into_raw_fd();

        let first = Arc::new(SocketHandle::new(fd));
        let second = Arc::clone(&first);

        drop(first);
        assert!(send_probe(fd) >= 0, "fd closed while still owned");

        drop(second);
        assert!(send_probe(fd) < 0, "fd still open after last owner dropped");
        drop(b);
    }
}
