//! Shroud record layer: symmetric, authenticated framing for byte streams.
//!
//! This crate provides:
//! - Key material handling ([`RecordKey`], [`ChannelKeys`], [`generate_key`])
//! - Per-direction record crypto ([`RecordCipher`])
//! - Payload ⇄ frame conversion ([`FrameCodec`])
//! - Incremental frame assembly from fragmented reads ([`FrameDecoder`])
//!
//! Everything here is pure computation over byte slices; the blocking
//! `Read`/`Write` adapters live in `shroud-stream`.
//!
//! # Wire Format
//!
//! A payload is split into records of at most the configured chunk limit,
//! and each record travels as one self-contained frame:
//!
//! ```text
//! byte  0        version (currently 1)
//! bytes 1..3     ciphertext length, unsigned 16-bit big-endian
//! bytes 3..3+L   ciphertext (AES-128, PKCS#7 padded)
//! bytes 3+L..+32 HMAC-SHA256 over (version || length || ciphertext)
//! ```
//!
//! Frames are independent: any frame can be verified and decrypted knowing
//! only the key. There is no session state, sequencing, or handshake.
//!
//! # Security Properties
//!
//! The MAC covers the full header and ciphertext, so truncation, bit flips,
//! and version forgery are all detected before any decryption is attempted.
//! Encryption itself is deterministic (no per-record nonce): equal records
//! under one key produce equal ciphertexts, which leaks message equality to
//! observers. See [`cipher`] for the full statement of that trade-off.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod codec;
pub mod decoder;
pub mod keys;

pub use cipher::RecordCipher;
pub use codec::FrameCodec;
pub use decoder::FrameDecoder;
pub use keys::{generate_key, ChannelKeys, KeySource, RecordKey};

/// Wire format version emitted by this build.
pub const WIRE_VERSION: u8 = 1;

/// Frame header length: version byte plus 16-bit ciphertext length.
pub const HEADER_LEN: usize = 3;

/// HMAC-SHA256 tag length.
pub const MAC_LEN: usize = 32;

/// AES block length; ciphertext is always a whole number of blocks.
pub const BLOCK_LEN: usize = 16;

/// Record key length (AES-128).
pub const KEY_LEN: usize = 16;

/// Largest admissible chunk limit.
///
/// The length field caps ciphertext at 65535 bytes, and PKCS#7 padding can
/// add up to one full block, so the largest record whose padded ciphertext
/// still fits is 65519 bytes.
pub const MAX_CHUNK_LIMIT: usize = 65535 - BLOCK_LEN;

/// Chunk limit used when the caller does not pick one.
pub const DEFAULT_CHUNK_LIMIT: usize = MAX_CHUNK_LIMIT;

/// Errors produced by the record layer.
///
/// Framing and integrity failures are fatal to the stream they occur on:
/// once bytes are misaligned or a tag fails to verify there is no way to
/// resynchronize, so callers are expected to tear the transport down.
#[derive(Debug, thiserror::Error)]
pub enum ShroudError {
    /// A contiguous buffer ended before the frame it started.
    #[error("truncated frame: have {got} of {needed} bytes")]
    Truncated { needed: usize, got: usize },

    /// The recomputed tag does not match the transmitted one. Corruption,
    /// tampering, or a key mismatch; indistinguishable by construction.
    #[error("record mac mismatch")]
    MacMismatch,

    /// The frame authenticated but carries a version this build does not
    /// speak.
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),

    /// Ciphertext failed block decryption (misaligned length or invalid
    /// padding) despite a valid tag. Indicates a malformed sender.
    #[error("record decryption failed")]
    Decrypt,

    /// Key material of the wrong size.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    KeyLength { expected: usize, got: usize },

    /// Key material that is not valid base64.
    #[error("invalid base64 key: {0}")]
    KeyEncoding(#[from] base64::DecodeError),

    /// Chunk limit outside `1..=MAX_CHUNK_LIMIT`.
    #[error("chunk limit {0} out of range (1..={MAX_CHUNK_LIMIT})")]
    ChunkLimit(usize),

    /// A byte source closed mid-record while a full frame was still owed.
    #[error("source closed mid-record")]
    Underflow,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
