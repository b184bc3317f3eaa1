//! Buffer and queue primitives for imsgkit.
//!
//! [`Buf`] is an owned, growable byte region with a consumed prefix, a hard
//! capacity ceiling and a single optional descriptor slot. [`MsgQueue`] is a
//! FIFO of fully formed `Buf`s awaiting transmission, drained one syscall at
//! a time from an external event loop.

#[cfg(not(unix))]
compile_error!("imsgkit-buf requires a Unix platform");

pub mod error;
pub mod ibuf;
pub mod queue;

pub use error::{BufError, Result};
pub use ibuf::Buf;
pub use queue::{FlushEvent, MsgQueue, WriteEvent};
