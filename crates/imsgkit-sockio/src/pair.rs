use std::os::fd::{FromRawFd, OwnedFd};

use tracing::debug;

use crate::error::{Result, SockError};

/// Create a connected `AF_UNIX`/`SOCK_STREAM` socket pair.
///
/// Both ends come back non-blocking and close-on-exec, which is the mode
/// every imsg channel expects: the library performs at most one syscall per
/// call and reports `WouldBlock` instead of sleeping. The usual pattern is
/// to create the pair before forking and hand one end to each process.
pub fn socket_pair() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0i32; 2];

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    let ty = libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    let ty = libc::SOCK_STREAM;

    // SAFETY: fds is a valid writable array of two ints.
    let rc = unsafe { libc::socketpair(libc::AF_UNIX, ty, 0, fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(SockError::Pair(std::io::Error::last_os_error()));
    }

    // SAFETY: socketpair succeeded, so both descriptors are open and owned
    // by this process from here on.
    let (a, b) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        set_nonblock_cloexec(&a)?;
        set_nonblock_cloexec(&b)?;
    }

    debug!("created non-blocking socket pair");
    Ok((a, b))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn set_nonblock_cloexec(fd: &OwnedFd) -> Result<()> {
    use std::os::fd::AsRawFd;

    let raw = fd.as_raw_fd();
    // SAFETY: fcntl on a descriptor we own, with documented argument shapes.
    unsafe {
        let fl = libc::fcntl(raw, libc::F_GETFL);
        if fl < 0 || libc::fcntl(raw, libc::F_SETFL, fl | libc::O_NONBLOCK) < 0 {
            return Err(SockError::Fcntl(std::io::Error::last_os_error()));
        }
        let fdfl = libc::fcntl(raw, libc::F_GETFD);
        if fdfl < 0 || libc::fcntl(raw, libc::F_SETFD, fdfl | libc::FD_CLOEXEC) < 0 {
            return Err(SockError::Fcntl(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_connected() {
        let (a, b) = socket_pair().unwrap();

        let n = crate::send_with_fd(a_fd(&a), b"ping", None).unwrap();
        assert_eq!(n, 4);

        let mut buf = [0u8; 16];
        let mut fds = Vec::new();
        let n = crate::recv_with_fd(a_fd(&b), &mut buf, &mut fds).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert!(fds.is_empty());
    }

    #[test]
    fn pair_is_nonblocking() {
        let (a, _b) = socket_pair().unwrap();

        let mut buf = [0u8; 16];
        let mut fds = Vec::new();
        let err = crate::recv_with_fd(a_fd(&a), &mut buf, &mut fds).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
    }

    fn a_fd(fd: &OwnedFd) -> std::os::fd::BorrowedFd<'_> {
        use std::os::fd::AsFd;
        fd.as_fd()
    }
}
