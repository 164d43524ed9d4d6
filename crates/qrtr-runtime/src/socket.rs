//! Linux `AF_QIPCRTR` datagram socket, backing [`qrtr_core::RawSocket`].

use std::mem;
use std::os::unix::io::RawFd;

use qrtr_core::error::{QrtrError, QrtrResult};
use qrtr_core::reactor::RawSocket;
use qrtr_core::wire::AF_QIPCRTR;

/// Mirrors the kernel's `struct sockaddr_qrtr`.
#[repr(C)]
#[derive(Clone, Copy)]
struct SockaddrQrtr {
    sq_family: libc::sa_family_t,
    sq_node: u32,
    sq_port: u32,
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}

/// A real, non-blocking `AF_QIPCRTR` datagram socket.
pub struct LinuxQrtrSocket {
    fd: RawFd,
}

impl LinuxQrtrSocket {
    /// Open a new QRTR datagram socket, bound to an auto-assigned local port.
    pub fn new() -> QrtrResult<Self> {
        let fd = unsafe { libc::socket(AF_QIPCRTR as i32, libc::SOCK_DGRAM, 0) };
        if fd < 0 {
            return Err(QrtrError::SocketCreate(errno()));
        }

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
        if flags >= 0 {
            unsafe {
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
            }
        }

        let addr = SockaddrQrtr {
            sq_family: AF_QIPCRTR,
            sq_node: 0,
            sq_port: 0,
        };
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const SockaddrQrtr as *const libc::sockaddr,
                mem::size_of::<SockaddrQrtr>() as u32,
            )
        };
        if rc < 0 {
            let e = errno();
            unsafe { libc::close(fd) };
            return Err(QrtrError::SocketCreate(e));
        }

        Ok(Self { fd })
    }
}

impl RawSocket for LinuxQrtrSocket {
    fn send_to(&self, buf: &[u8], node: u32, port: u32) -> QrtrResult<usize> {
        let addr = SockaddrQrtr {
            sq_family: AF_QIPCRTR,
            sq_node: node,
            sq_port: port,
        };
        let rc = unsafe {
            libc::sendto(
                self.fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
                &addr as *const SockaddrQrtr as *const libc::sockaddr,
                mem::size_of::<SockaddrQrtr>() as u32,
            )
        };
        if rc < 0 {
            return Err(QrtrError::SocketIo(errno()));
        }
        Ok(rc as usize)
    }

    fn recv_from(&self, buf: &mut [u8]) -> QrtrResult<(usize, u32, u32)> {
        let mut addr = SockaddrQrtr { sq_family: 0, sq_node: 0, sq_port: 0 };
        let mut addr_len = mem::size_of::<SockaddrQrtr>() as u32;
        let rc = unsafe {
            libc::recvfrom(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
                &mut addr as *mut SockaddrQrtr as *mut libc::sockaddr,
                &mut addr_len,
            )
        };
        if rc < 0 {
            return Err(QrtrError::SocketIo(errno()));
        }
        Ok((rc as usize, addr.sq_node, addr.sq_port))
    }

    fn local_address(&self) -> QrtrResult<(u32, u32)> {
        let mut addr = SockaddrQrtr { sq_family: 0, sq_node: 0, sq_port: 0 };
        let mut addr_len = mem::size_of::<SockaddrQrtr>() as u32;
        let rc = unsafe {
            libc::getsockname(self.fd, &mut addr as *mut SockaddrQrtr as *mut libc::sockaddr, &mut addr_len)
        };
        if rc < 0 {
            return Err(QrtrError::SocketIo(errno()));
        }
        if addr.sq_family != AF_QIPCRTR {
            return Err(QrtrError::SocketCreate(0));
        }
        Ok((addr.sq_node, addr.sq_port))
    }

    fn as_raw_fd(&self) -> i32 {
        self.fd
    }
}

impl Drop for LinuxQrtrSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
