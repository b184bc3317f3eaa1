/// Errors that can occur while building or transmitting buffers.
#[derive(Debug, thiserror::Error)]
pub enum BufError {
    /// Appending would grow the buffer past its configured ceiling.
    #[error("buffer limit exceeded ({size} bytes, max {max})")]
    BufferFull { size: usize, max: usize },

    /// The single descriptor slot is already occupied.
    #[error("descriptor slot already occupied")]
    FdAlreadyAttached,

    /// A write targeted a range that has not been filled yet.
    #[error("write at {pos}..{end} outside filled region of {len} bytes")]
    OutOfRange { pos: usize, end: usize, len: usize },

    /// An I/O error occurred while draining the queue.
    #[error("queue I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BufError>;
