//! Incremental assembly of a single frame from arbitrarily fragmented input.
//!
//! A [`FrameDecoder`] walks one frame through three phases:
//!
//! ```text
//! HEADER (3 bytes) --> BODY (ciphertext + tag) --> READY (record)
//! ```
//!
//! [`feed`] accepts whatever bytes the transport happened to deliver and
//! reports how many it consumed; bytes past the end of the current frame
//! stay with the caller for the next decoder. Once READY, the verified
//! record is handed out through [`drain`] in caller-sized pieces. A decoder
//! never decodes a second frame; callers start a fresh one per frame, which
//! keeps every state transition one-way.
//!
//! [`feed`]: FrameDecoder::feed
//! [`drain`]: FrameDecoder::drain

use tracing::trace;

use crate::cipher::RecordCipher;
use crate::{ShroudError, HEADER_LEN, MAC_LEN, WIRE_VERSION};

enum Phase {
    /// Collecting the fixed-size header.
    Header { buf: [u8; HEADER_LEN], filled: usize },
    /// Collecting ciphertext plus tag; the length came from the header.
    Body {
        header: [u8; HEADER_LEN],
        buf: Vec<u8>,
        filled: usize,
    },
    /// Record verified and decrypted; draining to the caller.
    Ready { record: Vec<u8>, cursor: usize },
}

/// Streaming decoder for exactly one frame.
pub struct FrameDecoder {
    cipher: RecordCipher,
    phase: Phase,
}

impl FrameDecoder {
    pub fn new(cipher: RecordCipher) -> Self {
        Self {
            cipher,
            phase: Phase::Header {
                buf: [0u8; HEADER_LEN],
                filled: 0,
            },
        }
    }

    /// True until a full frame has been fed.
    pub fn needs_data(&self) -> bool {
        !matches!(self.phase, Phase::Ready { .. })
    }

    /// Feed transport bytes into the frame, returning how many were
    /// consumed. Anything not consumed belongs to the next frame and must
    /// be offered again to its decoder.
    ///
    /// Verification runs the moment the last body byte lands: the tag is
    /// checked over header and ciphertext, then the version byte, then the
    /// record is decrypted. Any failure is fatal to the decoder and to the
    /// byte stream it was fed from.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize, ShroudError> {
        let mut consumed = 0;

        if let Phase::Header { buf, filled } = &mut self.phase {
            let take = (HEADER_LEN - *filled).min(chunk.len());
            buf[*filled..*filled + take].copy_from_slice(&chunk[..take]);
            *filled += take;
            consumed += take;
            if *filled < HEADER_LEN {
                return Ok(consumed);
            }
            let header = *buf;
            let ciphertext_len = u16::from_be_bytes([header[1], header[2]]) as usize;
            trace!(ciphertext_len, "frame header assembled");
            self.phase = Phase::Body {
                header,
                buf: vec![0u8; ciphertext_len + MAC_LEN],
                filled: 0,
            };
        }

        if let Phase::Body {
            header,
            buf,
            filled,
        } = &mut self.phase
        {
            let header = *header;
            let rest = &chunk[consumed..];
            let take = (buf.len() - *filled).min(rest.len());
            buf[*filled..*filled + take].copy_from_slice(&rest[..take]);
            *filled += take;
            consumed += take;
            if *filled < buf.len() {
                return Ok(consumed);
            }
            let (ciphertext, tag) = buf.split_at(buf.len() - MAC_LEN);
            self.cipher.verify_tag(&header, ciphertext, tag)?;
            if header[0] != WIRE_VERSION {
                return Err(ShroudError::UnsupportedVersion(header[0]));
            }
            let record = self.cipher.open(ciphertext)?;
            trace!(record_len = record.len(), "record verified");
            self.phase = Phase::Ready { record, cursor: 0 };
        }

        Ok(consumed)
    }

    /// Copy record bytes into `buf`, returning how many were copied. Zero
    /// means the decoder is not READY or the record is exhausted.
    pub fn drain(&mut self, buf: &mut [u8]) -> usize {
        match &mut self.phase {
            Phase::Ready { record, cursor } => {
                let take = (record.len() - *cursor).min(buf.len());
                buf[..take].copy_from_slice(&record[*cursor..*cursor + take]);
                *cursor += take;
                take
            }
            _ => 0,
        }
    }

    /// True while the READY record still has undrained bytes.
    pub fn has_more(&self) -> bool {
        match &self.phase {
            Phase::Ready { record, cursor } => *cursor < record.len(),
            _ => false,
        }
    }
}
