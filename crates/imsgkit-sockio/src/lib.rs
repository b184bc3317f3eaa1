//! Raw socket plumbing for imsgkit.
//!
//! Everything here is a thin wrapper over one syscall: [`socket_pair`] over
//! `socketpair(2)`, [`send_with_fd`] over `sendmsg(2)` and [`recv_with_fd`]
//! over `recvmsg(2)`. Descriptor transfer uses `SCM_RIGHTS` ancillary data
//! with control space reserved for exactly one descriptor per message.
//!
//! This is the lowest layer of imsgkit. The queueing and framing layers
//! build on top of it and never touch `libc` themselves.

#[cfg(not(unix))]
compile_error!("imsgkit-sockio requires a Unix platform (SCM_RIGHTS)");

pub mod error;
pub mod pair;
pub mod rights;

pub use error::{Result, SockError};
pub use pair::socket_pair;
pub use rights::{recv_with_fd, send_with_fd};
