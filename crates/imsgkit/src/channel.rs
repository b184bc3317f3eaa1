use std::collections::VecDeque;
use std::io::ErrorKind;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use bytes::BytesMut;
use tracing::{debug, warn};

use imsgkit_buf::{Buf, FlushEvent, MsgQueue, WriteEvent};

use crate::builder::ImsgBuilder;
use crate::error::{ImsgError, Result};
use crate::message::Imsg;
use crate::wire::{decode_frame, ChannelConfig};

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Outcome of a single [`Channel::read_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// This many bytes were appended to the receive buffer.
    Data(usize),
    /// Nothing to read right now; try again on the next readability
    /// notification.
    WouldBlock,
    /// The peer closed its end. Sticky: every subsequent call reports
    /// `Closed` again. Frames already buffered remain extractable via
    /// [`Channel::next_message`].
    Closed,
}

/// One end of an imsg connection.
///
/// Owns the socket, the output queue, the raw receive buffer and the inbox
/// of received-but-unclaimed descriptors. A channel belongs to exactly one
/// logical connection and carries no internal locking; drive it from a
/// single thread or guard it externally.
///
/// The socket must already be connected and non-blocking
/// ([`Channel::pair`] takes care of both).
#[derive(Debug)]
pub struct Channel {
    sock: OwnedFd,
    out: MsgQueue,
    rbuf: BytesMut,
    fd_inbox: VecDeque<OwnedFd>,
    own_pid: u32,
    config: ChannelConfig,
    eof: bool,
    fd_shortfall: u64,
}

impl Channel {
    /// Wrap a connected, non-blocking `AF_UNIX` socket.
    pub fn new(sock: OwnedFd) -> Self {
        Self::with_config(sock, ChannelConfig::default())
    }

    /// Wrap a socket with explicit configuration.
    pub fn with_config(sock: OwnedFd, config: ChannelConfig) -> Self {
        debug!(max_frame_size = config.max_frame_size, "channel created");
        Self {
            sock,
            out: MsgQueue::new(),
            rbuf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            fd_inbox: VecDeque::new(),
            own_pid: std::process::id(),
            config,
            eof: false,
            fd_shortfall: 0,
        }
    }

    /// Create two connected channels over a fresh socket pair.
    ///
    /// The usual privilege-separation pattern: build the pair, fork, keep
    /// one end in each process.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = imsgkit_sockio::socket_pair().map_err(std::io::Error::other)?;
        Ok((Self::new(a), Self::new(b)))
    }

    // ---- read side -----------------------------------------------------

    /// Perform one `recvmsg`, appending bytes to the receive buffer and
    /// moving any transferred descriptor into the inbox.
    ///
    /// At most one descriptor is associated with a message; extras that
    /// rode along in control-buffer padding are closed on the spot.
    pub fn read_once(&mut self) -> Result<ReadEvent> {
        if self.eof {
            return Ok(ReadEvent::Closed);
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut fds = Vec::new();
        let n = match imsgkit_sockio::recv_with_fd(self.sock.as_fd(), &mut chunk, &mut fds) {
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(ReadEvent::WouldBlock),
            Err(err) => return Err(ImsgError::Io(err)),
        };

        // Descriptors are owned either way; keep the first, close the rest.
        let mut fds = fds.into_iter();
        if let Some(fd) = fds.next() {
            self.fd_inbox.push_back(fd);
        }
        for _extra in fds {
            warn!("closing unexpected extra descriptor in ancillary data");
        }

        if n == 0 {
            self.eof = true;
            debug!("peer closed the channel");
            return Ok(ReadEvent::Closed);
        }

        self.rbuf.extend_from_slice(&chunk[..n]);
        Ok(ReadEvent::Data(n))
    }

    /// Extract at most one complete message from the receive buffer.
    ///
    /// `Ok(None)` means a frame is not yet complete; read more and call
    /// again. A frame flagged as carrying a descriptor claims the oldest
    /// inbox entry; if the inbox is empty (the peer claimed more
    /// descriptors than it transferred) the message simply has no
    /// descriptor and the [`fd_shortfall`](Channel::fd_shortfall) counter
    /// ticks up.
    pub fn next_message(&mut self) -> Result<Option<Imsg>> {
        let Some((header, payload)) = decode_frame(&mut self.rbuf, self.config.max_frame_size)?
        else {
            return Ok(None);
        };

        let fd = if header.has_fd() {
            let fd = self.fd_inbox.pop_front();
            if fd.is_none() {
                self.fd_shortfall += 1;
                warn!(
                    msg_type = header.msg_type,
                    "frame claims a descriptor but none was received"
                );
            }
            fd
        } else {
            None
        };

        Ok(Some(Imsg::new(header, payload, fd)))
    }

    // ---- write side ----------------------------------------------------

    /// Serialize and enqueue one message in a single call.
    ///
    /// Atomic: on any failure nothing is enqueued and `fd` is closed. A
    /// `pid` of 0 is replaced with this process's own pid.
    pub fn compose(
        &mut self,
        msg_type: u32,
        peer_id: u32,
        pid: u32,
        payload: &[u8],
        fd: Option<OwnedFd>,
    ) -> Result<()> {
        self.compose_vectored(msg_type, peer_id, pid, &[payload], fd)
    }

    /// Like [`compose`], with the payload supplied as several slices
    /// concatenated logically, avoiding a caller-side copy.
    ///
    /// [`compose`]: Channel::compose
    pub fn compose_vectored(
        &mut self,
        msg_type: u32,
        peer_id: u32,
        pid: u32,
        parts: &[&[u8]],
        fd: Option<OwnedFd>,
    ) -> Result<()> {
        let mut builder = self.builder(msg_type, peer_id, pid)?;
        for part in parts {
            builder.add(part)?;
        }
        if let Some(fd) = fd {
            builder.attach_fd(fd)?;
        }
        builder.finish()
    }

    /// Start the three-step create/add/finish form of frame construction.
    pub fn builder(&mut self, msg_type: u32, peer_id: u32, pid: u32) -> Result<ImsgBuilder<'_>> {
        ImsgBuilder::new(self, msg_type, peer_id, pid)
    }

    /// Re-enqueue a received message towards this channel's peer.
    ///
    /// Keeps the source's type, peer id, pid and payload. The descriptor is
    /// never carried over: forwarding a message across a process boundary
    /// does not implicitly re-grant descriptor access.
    pub fn forward(&mut self, msg: &Imsg) -> Result<()> {
        let mut builder = self.builder(msg.msg_type(), msg.peer_id(), msg.pid())?;
        builder.add(msg.data())?;
        builder.finish()
    }

    /// Issue at most one `sendmsg` from the output queue.
    pub fn write_once(&mut self) -> Result<WriteEvent> {
        self.out.write_once(self.sock.as_fd()).map_err(Into::into)
    }

    /// Drain the output queue until empty or the socket stops accepting.
    pub fn flush(&mut self) -> Result<FlushEvent> {
        self.out.flush(self.sock.as_fd()).map_err(Into::into)
    }

    /// Drop all queued-but-unsent frames, closing attached descriptors.
    pub fn clear(&mut self) {
        self.out.clear();
    }

    // ---- introspection -------------------------------------------------

    /// Unsent bytes currently queued.
    pub fn queued_len(&self) -> usize {
        self.out.queued_len()
    }

    /// Frames currently queued.
    pub fn pending(&self) -> usize {
        self.out.pending()
    }

    /// This process's pid, substituted for a caller-supplied pid of 0.
    pub fn own_pid(&self) -> u32 {
        self.own_pid
    }

    /// How many decoded frames claimed a descriptor the peer never
    /// transferred.
    pub fn fd_shortfall(&self) -> u64 {
        self.fd_shortfall
    }

    pub(crate) fn max_frame_size(&self) -> usize {
        self.config.max_frame_size
    }

    pub(crate) fn enqueue_frame(&mut self, buf: Buf) {
        self.out.enqueue(buf);
    }
}

impl AsFd for Channel {
    /// The socket to register with an event loop.
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.sock.as_fd()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if !self.fd_inbox.is_empty() {
            warn!(
                count = self.fd_inbox.len(),
                "closing unclaimed descriptors at channel teardown"
            );
        }
        debug!(
            queued = self.out.queued_len(),
            shortfall = self.fd_shortfall,
            "channel torn down"
        );
    }
}
