//! Payload ⇄ frame conversion over contiguous buffers and blocking readers.

use std::io::{self, Read};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::cipher::RecordCipher;
use crate::keys::RecordKey;
use crate::{
    ShroudError, BLOCK_LEN, DEFAULT_CHUNK_LIMIT, HEADER_LEN, MAC_LEN, MAX_CHUNK_LIMIT,
    WIRE_VERSION,
};

/// Stateless converter between payload bytes and authenticated frames.
///
/// `encode` splits a payload into records of at most the chunk limit and
/// seals each one; the decode methods reverse that. Instances carry only
/// key-derived state, so one codec can serve any number of payloads and
/// clones are interchangeable.
#[derive(Clone)]
pub struct FrameCodec {
    cipher: RecordCipher,
    chunk_limit: usize,
}

impl FrameCodec {
    /// Codec with the default chunk limit.
    pub fn new(key: &RecordKey) -> Self {
        Self {
            cipher: RecordCipher::new(key),
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        }
    }

    /// Codec with an explicit chunk limit in `1..=MAX_CHUNK_LIMIT`.
    ///
    /// The limit only shapes outgoing frames; decoding accepts any record
    /// size the length field can express.
    pub fn with_chunk_limit(key: &RecordKey, chunk_limit: usize) -> Result<Self, ShroudError> {
        if chunk_limit == 0 || chunk_limit > MAX_CHUNK_LIMIT {
            return Err(ShroudError::ChunkLimit(chunk_limit));
        }
        Ok(Self {
            cipher: RecordCipher::new(key),
            chunk_limit,
        })
    }

    pub fn chunk_limit(&self) -> usize {
        self.chunk_limit
    }

    pub fn cipher(&self) -> &RecordCipher {
        &self.cipher
    }

    /// Encode a payload as one or more consecutive frames.
    ///
    /// An empty payload still produces one frame carrying an empty record,
    /// so the receiving side observes the write.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let frames = payload.len().div_ceil(self.chunk_limit).max(1);
        let mut out =
            BytesMut::with_capacity(payload.len() + frames * (HEADER_LEN + MAC_LEN + BLOCK_LEN));
        if payload.is_empty() {
            self.encode_record(payload, &mut out);
        } else {
            for record in payload.chunks(self.chunk_limit) {
                self.encode_record(record, &mut out);
            }
        }
        out.freeze()
    }

    fn encode_record(&self, record: &[u8], out: &mut BytesMut) {
        let ciphertext = self.cipher.seal(record);
        let mut header = [0u8; HEADER_LEN];
        header[0] = WIRE_VERSION;
        header[1..].copy_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        let tag = self.cipher.tag(&header, &ciphertext);
        out.reserve(HEADER_LEN + ciphertext.len() + MAC_LEN);
        out.put_slice(&header);
        out.put_slice(&ciphertext);
        out.put_slice(&tag);
        trace!(
            record_len = record.len(),
            ciphertext_len = ciphertext.len(),
            "sealed record"
        );
    }

    /// Decode exactly the first frame of `frame`, ignoring trailing bytes.
    pub fn decode_one(&self, frame: &[u8]) -> Result<Vec<u8>, ShroudError> {
        let (record, _) = self.decode_front(frame)?;
        Ok(record)
    }

    /// Decode a buffer of consecutive frames back into the payload.
    ///
    /// The buffer must end exactly at a frame boundary; a dangling partial
    /// frame is reported as [`ShroudError::Truncated`].
    pub fn decode_all(&self, frames: &[u8]) -> Result<Vec<u8>, ShroudError> {
        let mut payload = Vec::with_capacity(frames.len());
        let mut rest = frames;
        while !rest.is_empty() {
            let (record, consumed) = self.decode_front(rest)?;
            payload.extend_from_slice(&record);
            rest = &rest[consumed..];
        }
        Ok(payload)
    }

    /// Read frames off a blocking source until it ends, handing each record
    /// to `sink` in order.
    ///
    /// The source ending cleanly between frames is a normal return; ending
    /// inside a frame is [`ShroudError::Underflow`].
    pub fn decode_stream<R, F>(&self, mut source: R, mut sink: F) -> Result<(), ShroudError>
    where
        R: Read,
        F: FnMut(&[u8]),
    {
        loop {
            let mut header = [0u8; HEADER_LEN];
            if !read_frame_start(&mut source, &mut header)? {
                return Ok(());
            }
            let ciphertext_len = u16::from_be_bytes([header[1], header[2]]) as usize;
            let mut body = vec![0u8; ciphertext_len + MAC_LEN];
            source.read_exact(&mut body).map_err(underflow_on_eof)?;
            let (ciphertext, tag) = body.split_at(ciphertext_len);
            self.cipher.verify_tag(&header, ciphertext, tag)?;
            if header[0] != WIRE_VERSION {
                return Err(ShroudError::UnsupportedVersion(header[0]));
            }
            let record = self.cipher.open(ciphertext)?;
            trace!(record_len = record.len(), "decoded record");
            sink(&record);
        }
    }

    /// Decode one frame off the front of `bytes`; returns the record and
    /// how many bytes the frame occupied.
    fn decode_front(&self, bytes: &[u8]) -> Result<(Vec<u8>, usize), ShroudError> {
        if bytes.len() < HEADER_LEN {
            return Err(ShroudError::Truncated {
                needed: HEADER_LEN,
                got: bytes.len(),
            });
        }
        let header = [bytes[0], bytes[1], bytes[2]];
        let ciphertext_len = u16::from_be_bytes([header[1], header[2]]) as usize;
        let frame_len = HEADER_LEN + ciphertext_len + MAC_LEN;
        if bytes.len() < frame_len {
            return Err(ShroudError::Truncated {
                needed: frame_len,
                got: bytes.len(),
            });
        }
        let ciphertext = &bytes[HEADER_LEN..HEADER_LEN + ciphertext_len];
        let tag = &bytes[HEADER_LEN + ciphertext_len..frame_len];
        // Authenticate before trusting anything the header claims.
        self.cipher.verify_tag(&header, ciphertext, tag)?;
        if header[0] != WIRE_VERSION {
            return Err(ShroudError::UnsupportedVersion(header[0]));
        }
        let record = self.cipher.open(ciphertext)?;
        Ok((record, frame_len))
    }
}

/// Fill a header from the source, distinguishing a clean end of stream
/// (nothing read, returns `false`) from an end inside the header.
fn read_frame_start<R: Read>(
    source: &mut R,
    header: &mut [u8; HEADER_LEN],
) -> Result<bool, ShroudError> {
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = match source.read(&mut header[filled..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ShroudError::Io(e)),
        };
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(ShroudError::Underflow);
        }
        filled += n;
    }
    Ok(true)
}

fn underflow_on_eof(err: io::Error) -> ShroudError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ShroudError::Underflow
    } else {
        ShroudError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::KEY_LEN;

    fn codec() -> FrameCodec {
        FrameCodec::new(&RecordKey::from_bytes(&[3u8; KEY_LEN]).unwrap())
    }

    #[test]
    fn round_trip_assorted_sizes() {
        let codec = codec();
        for len in [0usize, 1, 40, 4096, 320_000] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
            let frames = codec.encode(&payload);
            assert_eq!(codec.decode_all(&frames).unwrap(), payload, "len {len}");
        }
    }

    #[test]
    fn hello_world_frame_layout() {
        let codec = codec();
        let frame = codec.encode(b"hello world");
        assert_eq!(frame[0], WIRE_VERSION);
        let ciphertext_len = u16::from_be_bytes([frame[1], frame[2]]) as usize;
        assert!(ciphertext_len >= 11);
        assert_eq!(ciphertext_len % BLOCK_LEN, 0);
        assert_eq!(frame.len(), HEADER_LEN + ciphertext_len + MAC_LEN);
        assert_eq!(codec.decode_one(&frame).unwrap(), b"hello world");
    }

    #[test]
    fn large_payload_splits_into_records() {
        let codec = codec();
        let payload = vec![0x5Au8; MAX_CHUNK_LIMIT + 1];
        let frames = codec.encode(&payload);
        // Two frames: a maximal record and a single trailing byte.
        let first_ct = u16::from_be_bytes([frames[1], frames[2]]) as usize;
        let first_len = HEADER_LEN + first_ct + MAC_LEN;
        assert!(first_len < frames.len());
        let second_ct =
            u16::from_be_bytes([frames[first_len + 1], frames[first_len + 2]]) as usize;
        assert_eq!(second_ct, BLOCK_LEN);
        assert_eq!(frames.len(), first_len + HEADER_LEN + second_ct + MAC_LEN);
        assert_eq!(codec.decode_all(&frames).unwrap(), payload);
    }

    #[test]
    fn custom_chunk_limit_shapes_frames() {
        let key = RecordKey::from_bytes(&[3u8; KEY_LEN]).unwrap();
        let codec = FrameCodec::with_chunk_limit(&key, 5).unwrap();
        let frames = codec.encode(b"0123456789ab");
        // 12 bytes at limit 5: records of 5, 5, and 2 bytes.
        let mut records = 0;
        let mut rest = &frames[..];
        while !rest.is_empty() {
            let ct = u16::from_be_bytes([rest[1], rest[2]]) as usize;
            assert_eq!(ct, BLOCK_LEN);
            rest = &rest[HEADER_LEN + ct + MAC_LEN..];
            records += 1;
        }
        assert_eq!(records, 3);
        assert_eq!(codec.decode_all(&frames).unwrap(), b"0123456789ab");
    }

    #[test]
    fn chunk_limit_bounds() {
        let key = RecordKey::from_bytes(&[3u8; KEY_LEN]).unwrap();
        assert!(matches!(
            FrameCodec::with_chunk_limit(&key, 0),
            Err(ShroudError::ChunkLimit(0))
        ));
        assert!(FrameCodec::with_chunk_limit(&key, 1).is_ok());
        assert!(FrameCodec::with_chunk_limit(&key, MAX_CHUNK_LIMIT).is_ok());
        assert!(matches!(
            FrameCodec::with_chunk_limit(&key, MAX_CHUNK_LIMIT + 1),
            Err(ShroudError::ChunkLimit(_))
        ));
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = codec();
        assert_eq!(codec.encode(b"repeat me"), codec.encode(b"repeat me"));
    }

    #[test]
    fn empty_payload_still_frames() {
        let codec = codec();
        let frames = codec.encode(&[]);
        assert_eq!(
            frames.len(),
            HEADER_LEN + BLOCK_LEN + MAC_LEN,
            "empty record pads to one block"
        );
        assert_eq!(u16::from_be_bytes([frames[1], frames[2]]), BLOCK_LEN as u16);
        assert_eq!(codec.decode_all(&frames).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn tampering_any_bit_fails() {
        let codec = codec();
        let frame = codec.encode(b"hello world");
        for i in 0..frame.len() {
            for bit in 0..8 {
                let mut tampered = frame.to_vec();
                tampered[i] ^= 1 << bit;
                let result = codec.decode_one(&tampered);
                assert!(result.is_err(), "byte {i} bit {bit} accepted");
                // Flips inside the length field may first surface as a
                // truncated frame; everywhere else the tag must catch it.
                if i != 1 && i != 2 {
                    assert!(
                        matches!(result, Err(ShroudError::MacMismatch)),
                        "byte {i} bit {bit}"
                    );
                }
            }
        }
    }

    #[test]
    fn wrong_key_is_a_mac_mismatch() {
        let frame = codec().encode(b"for your eyes only");
        let other = FrameCodec::new(&RecordKey::from_bytes(&[9u8; KEY_LEN]).unwrap());
        assert!(matches!(
            other.decode_one(&frame),
            Err(ShroudError::MacMismatch)
        ));
    }

    #[test]
    fn authenticated_unknown_version_is_rejected() {
        let codec = codec();
        let ciphertext = codec.cipher().seal(b"from the future");
        let mut header = [2u8, 0, 0];
        header[1..].copy_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        let tag = codec.cipher().tag(&header, &ciphertext);
        let mut frame = header.to_vec();
        frame.extend_from_slice(&ciphertext);
        frame.extend_from_slice(&tag);
        assert!(matches!(
            codec.decode_one(&frame),
            Err(ShroudError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn authenticated_zero_length_ciphertext_is_rejected() {
        // The encoder never emits a zero-length ciphertext: even an empty
        // record pads to a block. Such a frame carries no padding to strip.
        let codec = codec();
        let header = [WIRE_VERSION, 0, 0];
        let tag = codec.cipher().tag(&header, b"");
        let mut frame = header.to_vec();
        frame.extend_from_slice(&tag);
        assert!(matches!(codec.decode_one(&frame), Err(ShroudError::Decrypt)));
    }

    #[test]
    fn truncation_reports_needed_bytes() {
        let codec = codec();
        let frame = codec.encode(b"cut me short");
        match codec.decode_one(&frame[..2]) {
            Err(ShroudError::Truncated { needed, got }) => {
                assert_eq!(needed, HEADER_LEN);
                assert_eq!(got, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match codec.decode_one(&frame[..frame.len() - 1]) {
            Err(ShroudError::Truncated { needed, got }) => {
                assert_eq!(needed, frame.len());
                assert_eq!(got, frame.len() - 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_one_ignores_trailing_bytes() {
        let codec = codec();
        let mut wire = codec.encode(b"first").to_vec();
        wire.extend_from_slice(&codec.encode(b"second"));
        assert_eq!(codec.decode_one(&wire).unwrap(), b"first");
    }

    #[test]
    fn decode_stream_yields_records_in_order() {
        let codec = codec();
        let mut wire = Vec::new();
        wire.extend_from_slice(&codec.encode(b"first"));
        wire.extend_from_slice(&codec.encode(b""));
        wire.extend_from_slice(&codec.encode(b"third"));
        let mut records: Vec<Vec<u8>> = Vec::new();
        codec
            .decode_stream(Cursor::new(wire), |record| records.push(record.to_vec()))
            .unwrap();
        assert_eq!(records, vec![b"first".to_vec(), Vec::new(), b"third".to_vec()]);
    }

    #[test]
    fn decode_stream_underflow_mid_frame() {
        let codec = codec();
        let frame = codec.encode(b"stream me");
        for cut in [1, HEADER_LEN, frame.len() - 1] {
            let result = codec.decode_stream(Cursor::new(frame[..cut].to_vec()), |_| {});
            assert!(
                matches!(result, Err(ShroudError::Underflow)),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn decode_stream_empty_source_is_clean() {
        let codec = codec();
        let mut seen = 0;
        codec
            .decode_stream(Cursor::new(Vec::new()), |_| seen += 1)
            .unwrap();
        assert_eq!(seen, 0);
    }
}
