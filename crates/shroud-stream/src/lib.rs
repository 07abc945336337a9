//! Blocking stream adapters over the Shroud record layer.
//!
//! This crate provides:
//! - [`DecryptingReader`]: a `Read` that yields plaintext from framed input
//! - [`EncryptingWriter`]: a `Write` that seals every write into frames
//! - [`CipherChannel`]: a `TcpStream` decorator wiring both directions up,
//!   splittable into independently owned read and write halves
//!
//! The adapters spawn nothing and share nothing; a split channel supports
//! the usual one-reader-thread plus one-writer-thread arrangement, and any
//! further locking is the application's business.

#![forbid(unsafe_code)]

pub mod channel;
pub mod reader;
pub mod writer;

pub use channel::{ChannelReader, ChannelWriter, CipherChannel};
pub use reader::DecryptingReader;
pub use writer::EncryptingWriter;

use std::io;

use shroud_core::ShroudError;

/// Record-layer failures surfaced through `Read`/`Write` keep their source
/// error for inspection; underflow maps to `UnexpectedEof`, everything else
/// that is not already I/O maps to `InvalidData`.
pub(crate) fn into_io_error(err: ShroudError) -> io::Error {
    match err {
        ShroudError::Io(err) => err,
        ShroudError::Underflow => io::Error::new(io::ErrorKind::UnexpectedEof, err),
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}
