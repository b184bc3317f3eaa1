use std::os::fd::OwnedFd;

use bytes::Bytes;

use crate::error::{ImsgError, Result};
use crate::wire::Header;

/// One decoded message: header, payload and the optionally transferred
/// file descriptor.
///
/// The descriptor is exclusively owned by the message until
/// [`take_fd`](Imsg::take_fd) hands it to the caller; if it is never taken
/// it is closed when the message is dropped.
#[derive(Debug)]
pub struct Imsg {
    header: Header,
    payload: Bytes,
    fd: Option<OwnedFd>,
}

impl Imsg {
    pub(crate) fn new(header: Header, payload: Bytes, fd: Option<OwnedFd>) -> Self {
        Self {
            header,
            payload,
            fd,
        }
    }

    /// Application-defined message kind.
    pub fn msg_type(&self) -> u32 {
        self.header.msg_type
    }

    /// Application-defined correlation/routing id.
    pub fn peer_id(&self) -> u32 {
        self.header.peer_id
    }

    /// Sender process id.
    pub fn pid(&self) -> u32 {
        self.header.pid
    }

    /// The decoded header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Payload length in bytes (frame length minus the header).
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    /// Take the transferred descriptor, leaving the slot empty.
    ///
    /// A second call yields `None`, not an error.
    pub fn take_fd(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    /// Whether a descriptor is still attached.
    pub fn has_fd(&self) -> bool {
        self.fd.is_some()
    }

    /// Borrow the transferred descriptor without taking ownership.
    pub fn fd(&self) -> Option<std::os::fd::BorrowedFd<'_>> {
        use std::os::fd::AsFd;
        self.fd.as_ref().map(|fd| fd.as_fd())
    }

    /// Copy the payload into `dst`, requiring an exact size match.
    ///
    /// This is the strict-size contract used for fixed-shape messages: a
    /// payload of any other length is a
    /// [`PayloadSizeMismatch`](ImsgError::PayloadSizeMismatch).
    pub fn copy_data(&self, dst: &mut [u8]) -> Result<()> {
        if self.payload.len() != dst.len() {
            return Err(ImsgError::PayloadSizeMismatch {
                expected: dst.len(),
                actual: self.payload.len(),
            });
        }
        dst.copy_from_slice(&self.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::HEADER_SIZE;

    fn msg(payload: &'static [u8]) -> Imsg {
        let header = Header {
            msg_type: 3,
            len: (HEADER_SIZE + payload.len()) as u32,
            flags: 0,
            peer_id: 11,
            pid: 99,
        };
        Imsg::new(header, Bytes::from_static(payload), None)
    }

    #[test]
    fn accessors_reflect_header() {
        let m = msg(b"abcd");
        assert_eq!(m.msg_type(), 3);
        assert_eq!(m.peer_id(), 11);
        assert_eq!(m.pid(), 99);
        assert_eq!(m.len(), 4);
        assert_eq!(m.data(), b"abcd");
        assert!(!m.has_fd());
    }

    #[test]
    fn copy_data_requires_exact_size() {
        let m = msg(b"abcd");

        let mut exact = [0u8; 4];
        m.copy_data(&mut exact).unwrap();
        assert_eq!(&exact, b"abcd");

        let mut wrong = [0u8; 8];
        let err = m.copy_data(&mut wrong).unwrap_err();
        assert!(matches!(
            err,
            ImsgError::PayloadSizeMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn take_fd_twice_yields_none() {
        let file = std::fs::File::open("/dev/null").unwrap();
        let header = Header {
            msg_type: 1,
            len: HEADER_SIZE as u32,
            flags: crate::wire::FLAG_HAS_FD,
            peer_id: 0,
            pid: 0,
        };
        let mut m = Imsg::new(header, Bytes::new(), Some(file.into()));

        assert!(m.has_fd());
        assert!(m.take_fd().is_some());
        assert!(m.take_fd().is_none());
        assert!(!m.has_fd());
    }
}
