use imsgkit_buf::BufError;

/// Errors that can occur while composing, transmitting or decoding
/// messages.
///
/// Transient conditions are not errors: "not writable" and "peer closed"
/// come back as [`ReadEvent`](crate::ReadEvent) /
/// [`WriteEvent`](crate::WriteEvent) values, and "frame not yet complete"
/// as `Ok(None)` from [`Channel::next_message`](crate::Channel::next_message).
#[derive(Debug, thiserror::Error)]
pub enum ImsgError {
    /// A frame length fell outside the valid range, on either the build or
    /// the parse side. Fatal to the channel when it comes off the wire.
    #[error("frame length {len} outside [{min}, {max}]")]
    FrameLengthOutOfRange { len: usize, min: usize, max: usize },

    /// A fixed-shape read found a payload of the wrong size.
    #[error("payload size mismatch (expected {expected} bytes, got {actual})")]
    PayloadSizeMismatch { expected: usize, actual: usize },

    /// A buffer would have grown past its ceiling.
    #[error("buffer limit exceeded ({size} bytes, max {max})")]
    BufferFull { size: usize, max: usize },

    /// The message's single descriptor slot is already occupied.
    #[error("descriptor slot already occupied")]
    FdAlreadyAttached,

    /// An OS-level I/O error; the caller should consider the channel dead.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BufError> for ImsgError {
    fn from(err: BufError) -> Self {
        match err {
            BufError::BufferFull { size, max } => ImsgError::BufferFull { size, max },
            BufError::FdAlreadyAttached => ImsgError::FdAlreadyAttached,
            BufError::OutOfRange { pos, end, len } => ImsgError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("buffer write at {pos}..{end} outside filled region of {len} bytes"),
            )),
            BufError::Io(io) => ImsgError::Io(io),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImsgError>;
