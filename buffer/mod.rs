// Buffered receive layer bound to one socket descriptor
//
// RxBuffer tops itself up with non-blocking recv calls and reports pending
// socket bytes via FIONREAD. It never closes the descriptor: descriptor
// lifetime belongs to the owning handle. A read error sets the sticky
// `failed` flag; the owning client checks it after every delegated call.
use std::os::fd::RawFd;
use tracing::warn;

const RX_CHUNK: usize = 1436;

pub struct RxBuffer {
    fd: RawFd,
    buf: Vec<u8>,
    pos: usize,
    fill: usize,
    failed: bool,
}

impl RxBuffer {
    /// Binds a buffer to an already-connected descriptor.
    pub fn new(fd: RawFd) -> Self {
        RxBuffer {
            fd,
            buf: vec![0u8; RX_CHUNK],
            pos: 0,
            fill: 0,
            failed: false,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Sticky failure flag, set once a read error is observed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Bytes readable right now: buffered bytes plus what the socket has
    /// pending. A failing FIONREAD query marks the buffer failed.
    pub fn available(&mut self) -> i32 {
        let buffered = (self.fill - self.pos) as i32;
        let mut pending: libc::c_int = 0;
        let res = unsafe { libc::ioctl(self.fd, libc::FIONREAD as libc::c_ulong, &mut pending) };
        if res < 0 {
            warn!(fd = self.fd, "FIONREAD query failed");
            self.failed = true;
            return buffered;
        }
        buffered + pending
    }

    /// Copy up to `out.len()` buffered bytes. Returns the count copied,
    /// 0 when nothing is available right now, -1 after a read error.
    pub fn read(&mut self, out: &mut [u8]) -> i32 {
        if self.failed {
            return -1;
        }
        if out.is_empty() {
            return 0;
        }
        if self.pos >= self.fill {
            self.refill();
            if self.failed {
                return -1;
            }
        }
        let have = self.fill - self.pos;
        if have == 0 {
            return 0;
        }
        let n = have.min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        n as i32
    }

    /// Next byte without consuming it, or -1 when none is available.
    pub fn peek(&mut self) -> i32 {
        if self.failed {
            return -1;
        }
        if self.pos >= self.fill {
            self.refill();
        }
        if self.failed || self.pos >= self.fill {
            return -1;
        }
        i32::from(self.buf[self.pos])
    }

    // Non-blocking top-up once the buffered window is drained.
    fn refill(&mut self) {
        self.pos = 0;
        self.fill = 0;
        let res = unsafe {
            libc::recv(
                self.fd,
                self.buf.as_mut_ptr() as *mut libc::c_void,
                self.buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if res > 0 {
            self.fill = res as usize;
        } else if res < 0 {
            let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if code != libc::EAGAIN && code != libc::EWOULDBLOCK {
                warn!(fd = self.fd, code, "rx buffer read failed");
                self.failed = true;
            }
        }
        // res == 0: orderly shutdown, nothing buffered
    }
}
