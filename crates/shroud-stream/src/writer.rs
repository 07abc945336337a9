//! `Write` adapter that seals every write into authenticated frames.

use std::io::{self, Write};

use shroud_core::{FrameCodec, RecordKey, ShroudError};
use tracing::trace;

/// Wraps a byte sink and turns plaintext writes into frames.
///
/// Each `write` call is encoded and pushed to the sink in full before
/// returning; there is no buffering or coalescing across calls, so every
/// record pays the fixed header-plus-tag overhead. Callers moving many
/// small pieces get the usual `BufWriter` advice, on the plaintext side.
///
/// An empty write still emits a frame so the peer observes it as an empty
/// record rather than silence.
pub struct EncryptingWriter<W> {
    inner: W,
    codec: FrameCodec,
}

impl<W: Write> EncryptingWriter<W> {
    pub fn new(key: &RecordKey, inner: W) -> Self {
        Self {
            inner,
            codec: FrameCodec::new(key),
        }
    }

    /// Writer whose records are capped at `chunk_limit` plaintext bytes.
    pub fn with_chunk_limit(
        key: &RecordKey,
        inner: W,
        chunk_limit: usize,
    ) -> Result<Self, ShroudError> {
        Ok(Self {
            inner,
            codec: FrameCodec::with_chunk_limit(key, chunk_limit)?,
        })
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let frames = self.codec.encode(buf);
        trace!(
            plaintext_len = buf.len(),
            wire_len = frames.len(),
            "sealing write"
        );
        self.inner.write_all(&frames)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use shroud_core::{BLOCK_LEN, HEADER_LEN, MAC_LEN};

    use super::*;

    fn key() -> RecordKey {
        RecordKey::from_bytes(&[21u8; 16]).unwrap()
    }

    #[test]
    fn writes_are_individually_framed() {
        let mut writer = EncryptingWriter::new(&key(), Vec::new());
        writer.write_all(b"first write").unwrap();
        writer.write_all(b"second write").unwrap();
        let wire = writer.into_inner();

        let codec = FrameCodec::new(&key());
        assert_eq!(codec.decode_one(&wire).unwrap(), b"first write");
        assert_eq!(codec.decode_all(&wire).unwrap(), b"first writesecond write");
    }

    #[test]
    fn per_write_overhead_is_fixed() {
        let mut writer = EncryptingWriter::new(&key(), Vec::new());
        assert_eq!(writer.write(b"hi").unwrap(), 2);
        let wire_len = writer.get_ref().len();
        // Two plaintext bytes pad to one block plus header and tag.
        assert_eq!(wire_len, HEADER_LEN + BLOCK_LEN + MAC_LEN);
    }

    #[test]
    fn empty_write_emits_an_empty_record() {
        let mut writer = EncryptingWriter::new(&key(), Vec::new());
        assert_eq!(writer.write(&[]).unwrap(), 0);
        let wire = writer.into_inner();
        assert!(!wire.is_empty());
        assert_eq!(
            FrameCodec::new(&key()).decode_all(&wire).unwrap(),
            Vec::<u8>::new()
        );
    }

    #[test]
    fn chunk_limit_caps_each_record() {
        let mut writer = EncryptingWriter::with_chunk_limit(&key(), Vec::new(), 4).unwrap();
        writer.write_all(b"twelve bytes").unwrap();
        let wire = writer.into_inner();
        let mut records = 0;
        let mut rest = &wire[..];
        while !rest.is_empty() {
            let ct = u16::from_be_bytes([rest[1], rest[2]]) as usize;
            rest = &rest[HEADER_LEN + ct + MAC_LEN..];
            records += 1;
        }
        assert_eq!(records, 3);
    }

    #[test]
    fn flush_reaches_the_sink() {
        struct CountingSink {
            flushes: usize,
        }
        impl Write for CountingSink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                self.flushes += 1;
                Ok(())
            }
        }
        let mut writer = EncryptingWriter::new(&key(), CountingSink { flushes: 0 });
        writer.write_all(b"x").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.get_ref().flushes, 1);
    }
}
