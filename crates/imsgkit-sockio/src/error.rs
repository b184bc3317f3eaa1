/// Errors that can occur while setting up imsg sockets.
///
/// The per-message send/receive paths return plain `std::io::Error` so that
/// callers can dispatch on `ErrorKind::WouldBlock` without unwrapping.
#[derive(Debug, thiserror::Error)]
pub enum SockError {
    /// Failed to create the connected socket pair.
    #[error("failed to create socket pair: {0}")]
    Pair(std::io::Error),

    /// Failed to configure descriptor flags on a created socket.
    #[error("failed to set descriptor flags: {0}")]
    Fcntl(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SockError>;
