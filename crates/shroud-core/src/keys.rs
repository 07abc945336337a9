//! Key material: validated record keys and the key-supply interface.
//!
//! Keys are opaque 16-byte secrets handed in by the application. Nothing
//! in this crate negotiates, derives, or rotates them on its own; rotation
//! happens only through an explicit [`ChannelKeys::rotate_read_key`] /
//! [`ChannelKeys::rotate_write_key`] call by the owner.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{ShroudError, KEY_LEN};

/// Generate `len` random key bytes from the OS CSPRNG.
///
/// Callers own the material and decide where it lives; the buffer wipes
/// itself on drop. Channel keys are always [`KEY_LEN`] bytes, but the
/// length is a parameter so callers with other suites can reuse this.
pub fn generate_key(len: usize) -> Zeroizing<Vec<u8>> {
    let mut bytes = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(bytes.as_mut_slice());
    bytes
}

/// Symmetric key for one direction of a channel.
///
/// Validated to [`KEY_LEN`] bytes at construction, so downstream code never
/// sees a bad key. Wipes itself on drop; `Debug` prints a fingerprint, never
/// the key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RecordKey([u8; KEY_LEN]);

impl RecordKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Build a key from raw bytes. Anything but [`KEY_LEN`] bytes is
    /// rejected here rather than surfacing later as a cipher failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShroudError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| ShroudError::KeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Parse a standard-alphabet base64 key, as printed by [`to_base64`].
    ///
    /// [`to_base64`]: Self::to_base64
    pub fn from_base64(encoded: &str) -> Result<Self, ShroudError> {
        let bytes = Zeroizing::new(BASE64.decode(encoded.trim())?);
        Self::from_bytes(&bytes)
    }

    /// Encode the key for storage or transfer out of band.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short hex digest of the key, safe to put in logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKey({})", self.fingerprint())
    }
}

/// Supplies the two unidirectional keys bound to one channel.
///
/// The write key seals outgoing records, the read key opens incoming ones.
/// Peers therefore hold mirrored pairs: one side's write key is the other
/// side's read key.
pub trait KeySource {
    fn write_key(&self) -> &RecordKey;
    fn read_key(&self) -> &RecordKey;
}

/// In-memory key pair for one channel.
#[derive(Clone, Debug)]
pub struct ChannelKeys {
    write: RecordKey,
    read: RecordKey,
}

impl ChannelKeys {
    pub fn new(write: RecordKey, read: RecordKey) -> Self {
        Self { write, read }
    }

    /// Validate both directions up front; construction is the only place
    /// bad key material can surface.
    pub fn from_bytes(write: &[u8], read: &[u8]) -> Result<Self, ShroudError> {
        Ok(Self {
            write: RecordKey::from_bytes(write)?,
            read: RecordKey::from_bytes(read)?,
        })
    }

    /// Fresh random keys for both directions.
    pub fn generate() -> Self {
        Self {
            write: RecordKey::generate(),
            read: RecordKey::generate(),
        }
    }

    /// Symmetric setup where both directions share one key.
    pub fn shared(key: RecordKey) -> Self {
        Self {
            write: key.clone(),
            read: key,
        }
    }

    /// Swap in a new write key. Takes effect for channels built after the
    /// swap; existing channels keep the key they were constructed with.
    pub fn rotate_write_key(&mut self, key: RecordKey) {
        self.write = key;
    }

    /// Swap in a new read key, same rules as [`rotate_write_key`].
    ///
    /// [`rotate_write_key`]: Self::rotate_write_key
    pub fn rotate_read_key(&mut self, key: RecordKey) {
        self.read = key;
    }
}

impl KeySource for ChannelKeys {
    fn write_key(&self) -> &RecordKey {
        &self.write
    }

    fn read_key(&self) -> &RecordKey {
        &self.read
    }
}
