use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use bytes::BytesMut;

use crate::error::{BufError, Result};

/// An owned, growable byte region with a consumed prefix and an optional
/// attached file descriptor.
///
/// A `Buf` is written monotonically while a frame is being built, then
/// frozen once it lands on a [`MsgQueue`](crate::MsgQueue); from that point
/// only the read cursor moves, as partial writes consume it from the front.
/// The descriptor slot holds at most one descriptor, closed on drop if it
/// was never taken.
#[derive(Debug)]
pub struct Buf {
    data: BytesMut,
    max_capacity: usize,
    fd: Option<OwnedFd>,
}

impl Buf {
    /// Create an empty buffer with an allocation hint and a hard ceiling.
    pub fn with_capacity(hint: usize, max_capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(hint.min(max_capacity)),
            max_capacity,
            fd: None,
        }
    }

    /// Append bytes, growing geometrically up to the ceiling.
    ///
    /// On [`BufError::BufferFull`] the buffer contents are unchanged; a
    /// half-built frame is useless, so callers discard the buffer.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let size = self.data.len() + bytes.len();
        if size > self.max_capacity {
            return Err(BufError::BufferFull {
                size,
                max: self.max_capacity,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Overwrite a range that has already been filled by [`append`].
    ///
    /// Used to patch a header once the final frame length is known.
    ///
    /// [`append`]: Buf::append
    pub fn set(&mut self, pos: usize, bytes: &[u8]) -> Result<()> {
        let end = pos.saturating_add(bytes.len());
        if end > self.data.len() {
            return Err(BufError::OutOfRange {
                pos,
                end,
                len: self.data.len(),
            });
        }
        self.data[pos..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Attach a descriptor to travel with this buffer's first transmission.
    ///
    /// The slot holds exactly one descriptor; a second attach is a caller
    /// error and the offered descriptor is closed.
    pub fn attach_fd(&mut self, fd: OwnedFd) -> Result<()> {
        if self.fd.is_some() {
            return Err(BufError::FdAlreadyAttached);
        }
        self.fd = Some(fd);
        Ok(())
    }

    /// Take the attached descriptor, leaving the slot empty.
    ///
    /// A second call yields `None`, not an error.
    pub fn take_fd(&mut self) -> Option<OwnedFd> {
        self.fd.take()
    }

    /// Borrow the attached descriptor without transferring ownership.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_ref().map(|fd| fd.as_fd())
    }

    /// Whether a descriptor is attached.
    pub fn has_fd(&self) -> bool {
        self.fd.is_some()
    }

    /// Bytes currently held, consumed prefix excluded.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Total bytes written so far. Identical to [`remaining`] until the
    /// read cursor starts moving.
    ///
    /// [`remaining`]: Buf::remaining
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether no unconsumed bytes remain.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The unconsumed bytes.
    pub fn chunk(&self) -> &[u8] {
        &self.data
    }

    /// Advance the read cursor past `n` transmitted bytes.
    pub fn advance(&mut self, n: usize) {
        use bytes::Buf as _;
        self.data.advance(n);
    }
}
