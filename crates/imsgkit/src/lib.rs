//! Typed, length-prefixed messages with file-descriptor passing for
//! privilege-separated processes.
//!
//! A [`Channel`] wraps one connected, non-blocking `AF_UNIX` socket and
//! multiplexes typed messages over it. Every message is framed with:
//! - A 4-byte application-defined message type
//! - A 4-byte frame length (header included)
//! - A flags word (bit 0 marks an accompanying descriptor)
//! - A 4-byte application-defined peer id, opaque to this library
//! - The sender's process id
//!
//! Descriptors travel as `SCM_RIGHTS` ancillary data, one per frame, and
//! are matched to decoded messages strictly in arrival order. The library
//! performs at most one syscall per call and never blocks; it is meant to
//! be driven from an event loop that watches the channel's socket.

#[cfg(not(unix))]
compile_error!("imsgkit requires a Unix platform (SCM_RIGHTS)");

pub mod builder;
pub mod channel;
pub mod error;
pub mod message;
pub mod wire;

pub use builder::ImsgBuilder;
pub use channel::{Channel, ReadEvent};
pub use error::{ImsgError, Result};
pub use imsgkit_buf::{FlushEvent, WriteEvent};
pub use message::Imsg;
pub use wire::{ChannelConfig, Header, DEFAULT_MAX_FRAME_SIZE, FLAG_HAS_FD, HEADER_SIZE};
