use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::core::message::{nlmsg_align, Batch};
use crate::error::{Error, Result};

/// Bound on one kernel round-trip so a lost ack cannot hang the caller while
/// the driver lock is held.
const RECV_TIMEOUT: Duration = Duration::from_secs(3);

const RECV_BUF_LEN: usize = 1 << 16;
const NLMSG_HDR_LEN: usize = 16;

/// A raw netlink socket plus the running sequence counter.
pub struct SocketHandle {
    fd: RawFd,
    seq: u32,
}

impl SocketHandle {
    pub fn new(proto: i32) -> Result<Self> {
        let fd = unsafe {
            libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC, proto)
        };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let handle = Self { fd, seq: 1 };

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let timeout = libc::timeval {
            tv_sec: RECV_TIMEOUT.as_secs() as libc::time_t,
            tv_usec: 0,
        };
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &timeout as *const libc::timeval as *const libc::c_void,
                mem::size_of::<libc::timeval>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(handle)
    }

    /// Sends a batch and waits for the kernel's per-message acks.
    ///
    /// Returns [`Error::Commit`] on the first negative ack. With
    /// `tolerate_enoent`, an `ENOENT` reply counts as success: during cleanup
    /// it means the object is already gone.
    pub fn commit(&mut self, batch: &Batch, tolerate_enoent: bool) -> Result<()> {
        let (buf, expected) = batch.serialize(&mut self.seq);
        self.send(&buf)?;

        tracing::debug!(bytes = buf.len(), expected_acks = expected, "committed netlink batch");

        let mut acked = 0;
        let mut rbuf = vec![0u8; RECV_BUF_LEN];
        while acked < expected {
            let n = self.recv(&mut rbuf)?;
            acked += self.count_acks(&rbuf[..n], tolerate_enoent)?;
        }

        Ok(())
    }

    fn count_acks(&self, buf: &[u8], tolerate_enoent: bool) -> Result<usize> {
        let mut acked = 0;
        let mut offset = 0;

        while offset + NLMSG_HDR_LEN <= buf.len() {
            let len = u32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
            if len < NLMSG_HDR_LEN || offset + len > buf.len() {
                break;
            }

            let kind = u16::from_ne_bytes(buf[offset + 4..offset + 6].try_into().unwrap());
            if kind == libc::NLMSG_ERROR as u16 {
                if len < NLMSG_HDR_LEN + 4 {
                    break;
                }
                let code =
                    i32::from_ne_bytes(buf[offset + 16..offset + 20].try_into().unwrap());
                match -code {
                    0 => acked += 1,
                    libc::ENOENT if tolerate_enoent => acked += 1,
                    errno => return Err(Error::Commit(io::Error::from_raw_os_error(errno))),
                }
            }

            offset += nlmsg_align(len);
        }

        Ok(acked)
    }

    fn send(&self, buf: &[u8]) -> Result<()> {
        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;

        let ret = unsafe {
            libc::sendto(
                self.fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let ret = unsafe {
            libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(ret as usize)
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_netfilter_socket() {
        // Opening and binding needs no privileges.
        let handle = SocketHandle::new(libc::NETLINK_NETFILTER).unwrap();
        assert!(handle.fd >= 0);
    }

    #[test]
    fn test_count_acks_parses_error_messages() {
        let handle = SocketHandle::new(libc::NETLINK_NETFILTER).unwrap();

        // One ack (error code 0) followed by an ENOENT reply.
        let mut buf = Vec::new();
        for code in [0i32, -libc::ENOENT] {
            buf.extend_from_slice(&20u32.to_ne_bytes());
            buf.extend_from_slice(&(libc::NLMSG_ERROR as u16).to_ne_bytes());
            buf.extend_from_slice(&0u16.to_ne_bytes());
            buf.extend_from_slice(&0u32.to_ne_bytes());
            buf.extend_from_slice(&0u32.to_ne_bytes());
            buf.extend_from_slice(&code.to_ne_bytes());
        }

        assert_eq!(handle.count_acks(&buf, true).unwrap(), 2);
        assert!(matches!(handle.count_acks(&buf, false), Err(Error::Commit(_))));
    }
}
