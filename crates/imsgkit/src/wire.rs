use bytes::{Buf as _, Bytes, BytesMut};

use crate::error::{ImsgError, Result};

/// Frame header: type (4) + len (4) + flags (2) + reserved (2) +
/// peer id (4) + pid (4) = 20 bytes.
pub const HEADER_SIZE: usize = 20;

/// Default maximum frame size, header included: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Header flag: exactly one file descriptor accompanies this frame.
pub const FLAG_HAS_FD: u16 = 0x0001;

/// The fixed frame header.
///
/// All integers are host byte order — this is a local IPC protocol, both
/// ends always run on the same machine.
///
/// Wire layout:
/// ```text
/// offset  0: u32 type
/// offset  4: u32 len      (whole frame, header included)
/// offset  8: u16 flags    (bit 0 = descriptor attached)
/// offset 10: u16 reserved (written as zero, ignored on read)
/// offset 12: u32 peer id
/// offset 16: u32 pid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Application-defined message kind.
    pub msg_type: u32,
    /// Total frame length, header included.
    pub len: u32,
    /// Flag bits; only [`FLAG_HAS_FD`] is defined.
    pub flags: u16,
    /// Application-defined correlation/routing id, opaque to the library.
    pub peer_id: u32,
    /// Sender process id.
    pub pid: u32,
}

impl Header {
    /// Whether a descriptor accompanies this frame.
    pub fn has_fd(&self) -> bool {
        self.flags & FLAG_HAS_FD != 0
    }

    /// Payload length (frame length minus the header).
    ///
    /// Zero for a header whose `len` field is below [`HEADER_SIZE`]; such
    /// headers never come out of [`decode_frame`], which rejects them, but
    /// the fields are public and a hand-built value must not panic here.
    pub fn payload_len(&self) -> usize {
        (self.len as usize).saturating_sub(HEADER_SIZE)
    }
}

/// Serialize a header into its 20-byte wire form.
pub fn encode_header(hdr: &Header) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[0..4].copy_from_slice(&hdr.msg_type.to_ne_bytes());
    out[4..8].copy_from_slice(&hdr.len.to_ne_bytes());
    out[8..10].copy_from_slice(&hdr.flags.to_ne_bytes());
    // out[10..12] stays zero (reserved)
    out[12..16].copy_from_slice(&hdr.peer_id.to_ne_bytes());
    out[16..20].copy_from_slice(&hdr.pid.to_ne_bytes());
    out
}

/// Decode one frame from the receive buffer.
///
/// Returns `Ok(None)` while the buffer holds less than a complete frame;
/// nothing is consumed, and the header is harmlessly re-decoded on the next
/// call. On success exactly `len` bytes are consumed. A length outside
/// `[HEADER_SIZE, max_frame_size]` is a protocol violation and consumes
/// nothing.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<(Header, Bytes)>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let hdr = Header {
        msg_type: u32::from_ne_bytes(src[0..4].try_into().unwrap()),
        len: u32::from_ne_bytes(src[4..8].try_into().unwrap()),
        flags: u16::from_ne_bytes(src[8..10].try_into().unwrap()),
        peer_id: u32::from_ne_bytes(src[12..16].try_into().unwrap()),
        pid: u32::from_ne_bytes(src[16..20].try_into().unwrap()),
    };

    let len = hdr.len as usize;
    if len < HEADER_SIZE || len > max_frame_size {
        return Err(ImsgError::FrameLengthOutOfRange {
            len,
            min: HEADER_SIZE,
            max: max_frame_size,
        });
    }

    if src.len() < len {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(len - HEADER_SIZE).freeze();

    Ok(Some((hdr, payload)))
}

/// Configuration for a [`Channel`](crate::Channel).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Maximum frame size in bytes, header included. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
