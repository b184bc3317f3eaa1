use std::collections::VecDeque;
use std::io::ErrorKind;
use std::os::fd::BorrowedFd;

use tracing::trace;

use crate::error::Result;
use crate::ibuf::Buf;

/// Outcome of a single [`MsgQueue::write_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteEvent {
    /// The kernel accepted this many bytes from the head buffer.
    Wrote(usize),
    /// The socket is not writable right now; try again on the next
    /// writability notification.
    WouldBlock,
}

/// Outcome of a [`MsgQueue::flush`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushEvent {
    /// Every queued buffer was fully transmitted.
    Drained,
    /// The socket stopped accepting bytes before the queue emptied.
    WouldBlock,
}

/// FIFO of fully formed buffers awaiting transmission.
///
/// Each entry is a complete serialized frame before it is enqueued. The
/// queue is drained by an external event loop, one syscall per
/// [`write_once`] call; a partial write is normal and resumes on the same
/// head buffer next time.
///
/// [`write_once`]: MsgQueue::write_once
#[derive(Debug, Default)]
pub struct MsgQueue {
    bufs: VecDeque<Buf>,
    queued: usize,
}

impl MsgQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fully formed buffer to the tail.
    pub fn enqueue(&mut self, buf: Buf) {
        self.queued += buf.remaining();
        self.bufs.push_back(buf);
    }

    /// Issue at most one `sendmsg` carrying as much of the head buffer as
    /// the kernel will take.
    ///
    /// The attached descriptor, if any, rides the first transmission of its
    /// buffer and is closed locally once that syscall has been issued —
    /// ownership passes to the kernel with the call. A fully sent head
    /// buffer is popped and freed. Calling on an empty queue reports
    /// `Wrote(0)`.
    pub fn write_once(&mut self, sock: BorrowedFd<'_>) -> Result<WriteEvent> {
        let Some(head) = self.bufs.front_mut() else {
            return Ok(WriteEvent::Wrote(0));
        };

        let n = match imsgkit_sockio::send_with_fd(sock, head.chunk(), head.fd()) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::WriteZero,
                    "socket accepted no bytes",
                )
                .into())
            }
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                return Ok(WriteEvent::WouldBlock)
            }
            Err(err) => return Err(err.into()),
        };

        // The descriptor went out with the syscall above; drop our copy.
        drop(head.take_fd());
        head.advance(n);
        self.queued -= n;
        if head.is_empty() {
            self.bufs.pop_front();
        }
        Ok(WriteEvent::Wrote(n))
    }

    /// Call [`write_once`] until the queue drains or the socket stops
    /// accepting bytes.
    ///
    /// [`write_once`]: MsgQueue::write_once
    pub fn flush(&mut self, sock: BorrowedFd<'_>) -> Result<FlushEvent> {
        while !self.bufs.is_empty() {
            if self.write_once(sock)? == WriteEvent::WouldBlock {
                return Ok(FlushEvent::WouldBlock);
            }
        }
        Ok(FlushEvent::Drained)
    }

    /// Total unsent bytes across all queued buffers.
    ///
    /// Callers watch this to decide whether to keep polling for
    /// writability.
    pub fn queued_len(&self) -> usize {
        self.queued
    }

    /// Number of buffers still queued.
    pub fn pending(&self) -> usize {
        self.bufs.len()
    }

    /// Whether nothing remains to transmit.
    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Drop every queued buffer without sending, closing any descriptors
    /// still attached. Used on teardown.
    pub fn clear(&mut self) {
        if !self.bufs.is_empty() {
            trace!(dropped = self.bufs.len(), "clearing unsent buffers");
        }
        self.bufs.clear();
        self.queued = 0;
    }
}
