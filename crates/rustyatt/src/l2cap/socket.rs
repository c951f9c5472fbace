//! L2CAP socket implementation
//!
//! A non-blocking `AF_BLUETOOTH`/`SOCK_SEQPACKET` socket registered with the
//! tokio reactor. Each read or write moves exactly one L2CAP SDU, which is
//! one ATT PDU on the fixed ATT channel.

use super::constants::*;
use super::types::*;
use crate::att::AttTransport;
use async_trait::async_trait;
use log::debug;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;

// Define the sockaddr_l2 structure
#[repr(C)]
struct SockaddrL2 {
    l2_family: libc::sa_family_t,
    l2_psm: u16,
    l2_bdaddr: [u8; 6],
    l2_cid: u16,
    l2_bdaddr_type: u8,
}

impl From<&L2capAddr> for SockaddrL2 {
    fn from(addr: &L2capAddr) -> Self {
        Self {
            l2_family: AF_BLUETOOTH as libc::sa_family_t,
            l2_psm: 0,
            l2_bdaddr: addr.bdaddr.bytes,
            l2_cid: addr.cid.to_le(),
            l2_bdaddr_type: addr.address_type.into(),
        }
    }
}

// Define the bt_security structure
#[repr(C)]
struct BtSecurity {
    level: u8,
    key_size: u8,
}

/// Represents an L2CAP socket
#[derive(Debug)]
pub struct L2capSocket {
    fd: AsyncFd<OwnedFd>,
}

impl L2capSocket {
    /// Opens a new L2CAP socket bound to `local` with the given security level
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(local: &L2capAddr, security: SecurityLevel) -> L2capResult<Self> {
        let fd = unsafe {
            libc::socket(
                AF_BLUETOOTH,
                libc::SOCK_SEQPACKET | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                BTPROTO_L2CAP,
            )
        };

        if fd < 0 {
            return Err(L2capError::SocketError(io::Error::last_os_error()));
        }

        // The OwnedFd closes the socket on every early return below
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };

        let addr = SockaddrL2::from(local);
        let result = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<SockaddrL2>() as libc::socklen_t,
            )
        };

        if result < 0 {
            return Err(L2capError::BindError(io::Error::last_os_error()));
        }

        let btsec = BtSecurity {
            level: security.into(),
            key_size: 0,
        };
        let result = unsafe {
            libc::setsockopt(
                fd,
                SOL_BLUETOOTH,
                BT_SECURITY,
                &btsec as *const _ as *const libc::c_void,
                std::mem::size_of::<BtSecurity>() as libc::socklen_t,
            )
        };

        if result < 0 {
            return Err(L2capError::SecurityError(io::Error::last_os_error()));
        }

        // SAFETY: the AsyncFd takes ownership of the open socket and closes it on drop
        let fd = unsafe { AsyncFd::register(owned) }
            .map_err(|e| L2capError::SocketError(e.into()))?;
        debug!("Bound L2CAP socket to {}", local);

        Ok(Self { fd })
    }

    /// Connect to `remote`, waiting for the connection to complete
    pub async fn connect(&self, remote: &L2capAddr) -> L2capResult<()> {
        let addr = SockaddrL2::from(remote);
        let result = unsafe {
            libc::connect(
                self.as_raw_fd(),
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<SockaddrL2>() as libc::socklen_t,
            )
        };

        if result == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINPROGRESS) {
            return Err(L2capError::ConnectError(err));
        }

        // Connection completes when the socket becomes writable
        let _guard = self.fd.writable().await.map_err(L2capError::ConnectError)?;

        match self.take_error() {
            Ok(None) => Ok(()),
            Ok(Some(err)) | Err(err) => Err(L2capError::ConnectError(err)),
        }
    }

    /// Gets the raw file descriptor for the socket
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Fetch and clear the pending socket error
    fn take_error(&self) -> io::Result<Option<io::Error>> {
        let mut error: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

        let result = unsafe {
            libc::getsockopt(
                self.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut error as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok((error != 0).then(|| io::Error::from_raw_os_error(error)))
    }
}

#[async_trait]
impl AttTransport for L2capSocket {
    async fn read_frame(&mut self) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let mut guard = self.fd.readable().await?;

            let result = guard.try_io(|fd| {
                let n = unsafe {
                    libc::read(
                        fd.as_raw_fd(),
                        buffer.as_mut_ptr() as *mut libc::c_void,
                        buffer.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(Ok(0)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "L2CAP channel closed by peer",
                    ))
                }
                Ok(Ok(n)) => {
                    buffer.truncate(n);
                    return Ok(buffer);
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable().await?;

            let result = guard.try_io(|fd| {
                let n = unsafe {
                    libc::write(
                        fd.as_raw_fd(),
                        frame.as_ptr() as *const libc::c_void,
                        frame.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });

            match result {
                Ok(written) => return written,
                Err(_would_block) => continue,
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        let result = unsafe { libc::shutdown(self.as_raw_fd(), libc::SHUT_RDWR) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOTCONN) {
                return Err(err);
            }
        }

        Ok(())
    }
}

impl AsRawFd for L2capSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockaddr_l2_layout() {
        // Matches the kernel's struct sockaddr_l2
        assert_eq!(std::mem::size_of::<SockaddrL2>(), 14);
        assert_eq!(std::mem::size_of::<BtSecurity>(), 2);
    }

    #[test]
    fn test_sockaddr_l2_from_addr() {
        let addr = L2capAddr::new(
            "60:8A:10:5C:40:9C".parse().unwrap(),
            0x0004,
            AddressType::LePublic,
        );
        let raw = SockaddrL2::from(&addr);
        assert_eq!(raw.l2_family, AF_BLUETOOTH as libc::sa_family_t);
        assert_eq!(raw.l2_psm, 0);
        assert_eq!(raw.l2_bdaddr, [0x9C, 0x40, 0x5C, 0x10, 0x8A, 0x60]);
        assert_eq!(u16::from_le(raw.l2_cid), 0x0004);
        assert_eq!(raw.l2_bdaddr_type, BDADDR_LE_PUBLIC);
    }
}
