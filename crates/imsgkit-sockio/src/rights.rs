use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::warn;

/// Control buffer with room for one `SCM_RIGHTS` record.
///
/// Two descriptor slots are declared even though one is requested: on LP64
/// platforms `CMSG_SPACE` rounds the data area up to eight bytes, so the
/// kernel can squeeze a second descriptor into the padding. The receive path
/// keeps the first and closes the rest.
#[repr(C)]
struct CmsgOneFd {
    hdr: libc::cmsghdr,
    fds: [RawFd; 2],
}

/// Send `bytes` over `sock` with one `sendmsg(2)` call, carrying `fd` as an
/// `SCM_RIGHTS` record if present.
///
/// Returns the number of payload bytes the kernel accepted, which may be
/// fewer than offered; the ancillary record travels with whatever prefix
/// was accepted. `EINTR` is retried internally, every other error (including
/// `EAGAIN`, surfaced as `WouldBlock`) is returned to the caller.
// musl declares cmsg_len/msg_controllen with different widths than glibc,
// hence the conversion lints.
#[allow(clippy::unnecessary_cast)]
pub fn send_with_fd(
    sock: BorrowedFd<'_>,
    bytes: &[u8],
    fd: Option<BorrowedFd<'_>>,
) -> io::Result<usize> {
    loop {
        let mut iov = libc::iovec {
            iov_base: bytes.as_ptr() as *mut libc::c_void,
            iov_len: bytes.len(),
        };

        // SAFETY: all-zero is a valid representation for both structs.
        let mut cmsg: CmsgOneFd = unsafe { std::mem::zeroed() };
        // SAFETY: as above.
        let mut hdr: libc::msghdr = unsafe { std::mem::zeroed() };
        hdr.msg_iov = &mut iov;
        hdr.msg_iovlen = 1;

        if let Some(fd) = fd {
            cmsg.hdr.cmsg_level = libc::SOL_SOCKET;
            cmsg.hdr.cmsg_type = libc::SCM_RIGHTS;
            cmsg.hdr.cmsg_len = (size_of::<libc::cmsghdr>() + size_of::<RawFd>()) as _;
            cmsg.fds[0] = fd.as_raw_fd();
            hdr.msg_control = std::ptr::from_mut(&mut cmsg).cast::<libc::c_void>();
            hdr.msg_controllen = cmsg.hdr.cmsg_len as _;
        }

        #[cfg(any(target_os = "linux", target_os = "android"))]
        let flags = libc::MSG_NOSIGNAL;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let flags = 0;

        // SAFETY: hdr points at buffers that stay alive across the call.
        let n = unsafe { libc::sendmsg(sock.as_raw_fd(), &hdr, flags) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        return Ok(n as usize);
    }
}

/// Receive into `buf` with one `recvmsg(2)` call, collecting any transferred
/// descriptors into `fds`.
///
/// Returns the number of payload bytes read; zero means the peer closed its
/// end. Every received descriptor is taken into process ownership before
/// anything else can fail, so none can leak. `EINTR` is retried internally.
/// `EMSGSIZE` (the peer queued more ancillary data than the one-descriptor
/// control buffer holds) is also retried: the policy is to accept the bytes
/// and let the overflow descriptors go.
#[allow(clippy::unnecessary_cast)]
pub fn recv_with_fd(
    sock: BorrowedFd<'_>,
    buf: &mut [u8],
    fds: &mut Vec<OwnedFd>,
) -> io::Result<usize> {
    loop {
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast::<libc::c_void>(),
            iov_len: buf.len(),
        };

        // SAFETY: all-zero is a valid representation for both structs.
        let mut cmsg: CmsgOneFd = unsafe { std::mem::zeroed() };
        // SAFETY: as above.
        let mut hdr: libc::msghdr = unsafe { std::mem::zeroed() };
        hdr.msg_iov = &mut iov;
        hdr.msg_iovlen = 1;
        hdr.msg_control = std::ptr::from_mut(&mut cmsg).cast::<libc::c_void>();
        hdr.msg_controllen = size_of::<CmsgOneFd>() as _;

        // Received descriptors get close-on-exec atomically where the
        // kernel supports it, via fcntl below otherwise.
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let flags = libc::MSG_CMSG_CLOEXEC;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let flags = 0;

        // SAFETY: hdr points at buffers that stay alive across the call.
        let n = unsafe { libc::recvmsg(sock.as_raw_fd(), &mut hdr, flags) };
        if n < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EMSGSIZE) => continue,
                _ => return Err(err),
            }
        }

        let fd_count = if hdr.msg_controllen as usize >= size_of::<libc::cmsghdr>()
            && cmsg.hdr.cmsg_level == libc::SOL_SOCKET
            && cmsg.hdr.cmsg_type == libc::SCM_RIGHTS
        {
            (cmsg.hdr.cmsg_len as usize - size_of::<libc::cmsghdr>()) / size_of::<RawFd>()
        } else {
            0
        };

        let start = fds.len();
        fds.extend(cmsg.fds[..fd_count.min(cmsg.fds.len())].iter().map(|raw| {
            // SAFETY: the kernel handed these descriptors to this process;
            // they are ours to own from this point.
            unsafe { OwnedFd::from_raw_fd(*raw) }
        }));

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        for fd in &fds[start..] {
            set_cloexec(fd);
        }
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let _ = start;

        // Checked only after taking ownership of the descriptors above.
        if hdr.msg_flags & libc::MSG_CTRUNC != 0 {
            warn!("ancillary data truncated; descriptors beyond the first were dropped");
        }

        return Ok(n as usize);
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: &OwnedFd) {
    // SAFETY: fcntl on a descriptor we own.
    unsafe {
        let flags = libc::fcntl(fd.as_raw_fd(), libc::F_GETFD);
        if flags >= 0 {
            let _ = libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
}
