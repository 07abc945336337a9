//! `Read` adapter that decrypts framed input on the fly.

use std::io::{self, Read};

use shroud_core::{FrameDecoder, RecordCipher, RecordKey};
use tracing::trace;

use crate::into_io_error;

/// Wraps a byte source carrying frames and reads back the records inside.
///
/// One frame is assembled at a time. Raw reads are sized by the caller's
/// buffer rather than by what the current frame still needs, so a read can
/// land bytes belonging to the next frame; those are carried over and fed
/// to the next decoder before the source is touched again.
///
/// A source that ends mid-frame reads as a plain end of stream. Telling
/// that apart from a clean boundary requires frame-level decoding; see
/// `FrameCodec::decode_stream` for the strict variant.
pub struct DecryptingReader<R> {
    inner: R,
    cipher: RecordCipher,
    record: FrameDecoder,
    carry: Vec<u8>,
    carry_pos: usize,
}

impl<R: Read> DecryptingReader<R> {
    pub fn new(key: &RecordKey, inner: R) -> Self {
        let cipher = RecordCipher::new(key);
        let record = FrameDecoder::new(cipher.clone());
        Self {
            inner,
            cipher,
            record,
            carry: Vec::new(),
            carry_pos: 0,
        }
    }

    /// Read a single plaintext byte, `None` at end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut one = [0u8; 1];
        match self.read(&mut one)? {
            0 => Ok(None),
            _ => Ok(Some(one[0])),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            // Bytes carried past the previous frame seed the current one.
            while self.record.needs_data() && self.carry_pos < self.carry.len() {
                let n = self
                    .record
                    .feed(&self.carry[self.carry_pos..])
                    .map_err(into_io_error)?;
                self.carry_pos += n;
            }

            if self.record.needs_data() {
                // The carry is exhausted here, so overwriting it is safe.
                let mut raw = vec![0u8; buf.len()];
                while self.record.needs_data() {
                    let read = self.inner.read(&mut raw)?;
                    if read == 0 {
                        // Source ended; an unfinished frame is simply gone.
                        return Ok(0);
                    }
                    let consumed = self.record.feed(&raw[..read]).map_err(into_io_error)?;
                    if consumed < read {
                        self.carry.clear();
                        self.carry.extend_from_slice(&raw[consumed..read]);
                        self.carry_pos = 0;
                    }
                }
            }

            let n = self.record.drain(buf);
            if !self.record.has_more() {
                trace!("record drained, arming next frame");
                self.record = FrameDecoder::new(self.cipher.clone());
            }
            if n > 0 {
                return Ok(n);
            }
            // A zero-length record drains to nothing; returning 0 would
            // read as end of stream, so move on to the next frame.
        }
    }
}
