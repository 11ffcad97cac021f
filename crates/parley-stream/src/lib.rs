#![deny(unsafe_code)]

//! Byte-stream transports for the parley RPC runtime.
//!
//! A byte stream has no message boundaries, so messages travel as
//! length-prefixed frames: the 8-byte message header, a `u32` payload
//! length, then the payload. [`StreamTransport`] wraps any
//! `AsyncRead + AsyncWrite` stream in that framing; [`tcp`] provides the
//! socket connector and listener, and [`mem`] an in-process pair for tests
//! and demos.

mod framing;
pub mod mem;
pub mod tcp;

pub use framing::{FrameReader, FrameWriter, StreamTransport};

// Re-exported for convenience.
pub use parley_session::{CancelToken, Transport};
pub use parley_wire::Message;
