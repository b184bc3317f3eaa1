use std::os::fd::OwnedFd;

use imsgkit_buf::Buf;

use crate::channel::Channel;
use crate::error::{ImsgError, Result};
use crate::wire::{encode_header, Header, FLAG_HAS_FD, HEADER_SIZE};

/// Incremental frame construction: create, add payload in pieces, finish.
///
/// This is the three-step form behind
/// [`Channel::compose`](crate::Channel::compose); it exists for callers
/// that interleave other work between allocating a frame and sealing it.
/// Dropping a builder without calling [`finish`](ImsgBuilder::finish)
/// discards the half-built frame and closes any attached descriptor;
/// nothing reaches the queue.
#[derive(Debug)]
pub struct ImsgBuilder<'a> {
    chan: &'a mut Channel,
    buf: Buf,
    header: Header,
}

impl<'a> ImsgBuilder<'a> {
    pub(crate) fn new(chan: &'a mut Channel, msg_type: u32, peer_id: u32, pid: u32) -> Result<Self> {
        let pid = if pid == 0 { chan.own_pid() } else { pid };
        let mut buf = Buf::with_capacity(HEADER_SIZE, chan.max_frame_size());
        // Placeholder header, patched with the final length in finish().
        buf.append(&[0u8; HEADER_SIZE])?;
        Ok(Self {
            chan,
            buf,
            header: Header {
                msg_type,
                len: 0,
                flags: 0,
                peer_id,
                pid,
            },
        })
    }

    /// Append payload bytes to the frame under construction.
    pub fn add(&mut self, data: &[u8]) -> Result<()> {
        let len = self.buf.len() + data.len();
        if len > self.chan.max_frame_size() {
            return Err(ImsgError::FrameLengthOutOfRange {
                len,
                min: HEADER_SIZE,
                max: self.chan.max_frame_size(),
            });
        }
        self.buf.append(data)?;
        Ok(())
    }

    /// Attach the descriptor to travel with this frame.
    pub fn attach_fd(&mut self, fd: OwnedFd) -> Result<()> {
        self.buf.attach_fd(fd)?;
        Ok(())
    }

    /// Seal the frame and enqueue it for transmission.
    ///
    /// Computes the final length from whatever was added, sets the
    /// descriptor flag iff one is attached, and hands the buffer to the
    /// channel's output queue.
    pub fn finish(mut self) -> Result<()> {
        self.header.len = self.buf.len() as u32;
        if self.buf.has_fd() {
            self.header.flags |= FLAG_HAS_FD;
        }
        self.buf.set(0, &encode_header(&self.header))?;
        self.chan.enqueue_frame(self.buf);
        Ok(())
    }
}
