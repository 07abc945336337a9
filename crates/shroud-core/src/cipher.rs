//! Per-direction record crypto: AES-128 blocks plus HMAC-SHA256 tags.
//!
//! Records are encrypted with AES-128 in ECB mode under PKCS#7 padding and
//! authenticated with HMAC-SHA256 over the frame header and ciphertext.
//! ECB uses no per-record nonce, so encryption is deterministic: equal
//! records under one key produce equal ciphertexts, and block-aligned
//! repetition inside a record shows through. That leak is part of the wire
//! contract this layer speaks; peers on the other end expect exactly these
//! bytes. Confidentiality here means "not readable without the key", not
//! semantic security. Anyone free to change the wire format should move to
//! an AEAD.
//!
//! Both primitives are keyed once at construction. Per-record work is a
//! clone of the keyed MAC and a fresh block-cipher schedule, so a bad key
//! can only fail construction, never a later record.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use aes::Aes128;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::keys::RecordKey;
use crate::{ShroudError, MAC_LEN};

type EcbEnc = ecb::Encryptor<Aes128>;
type EcbDec = ecb::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Seals and opens individual records for one direction of a channel.
///
/// Cheap to clone; clones share nothing mutable.
#[derive(Clone)]
pub struct RecordCipher {
    key: RecordKey,
    mac: HmacSha256,
}

impl RecordCipher {
    pub fn new(key: &RecordKey) -> Self {
        // Both `Mac` and the in-scope `KeyInit` provide `new_from_slice`.
        let mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
            .expect("hmac-sha256 accepts fixed-size record keys");
        Self {
            key: key.clone(),
            mac,
        }
    }

    /// Encrypt one record. Padding always adds at least one byte, so even
    /// an empty record produces one full ciphertext block.
    pub fn seal(&self, record: &[u8]) -> Vec<u8> {
        EcbEnc::new(self.key.as_bytes().into()).encrypt_padded_vec_mut::<Pkcs7>(record)
    }

    /// Decrypt one record. Callers verify the tag first; a failure here
    /// means the sender produced misaligned or badly padded ciphertext.
    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, ShroudError> {
        EcbDec::new(self.key.as_bytes().into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| ShroudError::Decrypt)
    }

    /// Compute the tag over a frame's header and ciphertext.
    pub fn tag(&self, header: &[u8], ciphertext: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = self.mac.clone();
        mac.update(header);
        mac.update(ciphertext);
        mac.finalize().into_bytes().into()
    }

    /// Verify a transmitted tag in constant time.
    pub fn verify_tag(
        &self,
        header: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<(), ShroudError> {
        let mut mac = self.mac.clone();
        mac.update(header);
        mac.update(ciphertext);
        mac.verify_slice(tag).map_err(|_| ShroudError::MacMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_LEN;

    fn cipher() -> RecordCipher {
        RecordCipher::new(&RecordKey::from_bytes(&[7u8; 16]).unwrap())
    }

    #[test]
    fn seal_open_round_trip() {
        let cipher = cipher();
        for record in [&b""[..], b"x", b"exactly sixteen!", b"just over one block"] {
            let ciphertext = cipher.seal(record);
            assert_eq!(ciphertext.len() % BLOCK_LEN, 0);
            assert!(ciphertext.len() > record.len());
            assert_eq!(cipher.open(&ciphertext).unwrap(), record);
        }
    }

    #[test]
    fn sealing_is_deterministic() {
        let cipher = cipher();
        assert_eq!(cipher.seal(b"same bytes"), cipher.seal(b"same bytes"));
    }

    #[test]
    fn open_rejects_misaligned_ciphertext() {
        let cipher = cipher();
        let mut ciphertext = cipher.seal(b"whole record");
        ciphertext.pop();
        assert!(matches!(cipher.open(&ciphertext), Err(ShroudError::Decrypt)));
    }

    #[test]
    fn open_rejects_empty_ciphertext() {
        // Zero blocks carry no padding byte, so there is nothing to strip.
        assert!(matches!(cipher().open(&[]), Err(ShroudError::Decrypt)));
    }

    #[test]
    fn tag_verifies_and_rejects() {
        let cipher = cipher();
        let header = [1u8, 0, 16];
        let ciphertext = cipher.seal(b"tagged");
        let tag = cipher.tag(&header, &ciphertext);
        assert!(cipher.verify_tag(&header, &ciphertext, &tag).is_ok());

        let mut bad = tag;
        bad[0] ^= 1;
        assert!(matches!(
            cipher.verify_tag(&header, &ciphertext, &bad),
            Err(ShroudError::MacMismatch)
        ));
        // A different header invalidates the same tag.
        assert!(matches!(
            cipher.verify_tag(&[1u8, 0, 32], &ciphertext, &tag),
            Err(ShroudError::MacMismatch)
        ));
    }

    #[test]
    fn tag_matches_a_freshly_keyed_hmac() {
        let key = RecordKey::from_bytes(&[9u8; 16]).unwrap();
        let cipher = RecordCipher::new(&key);
        let ciphertext = cipher.seal(b"cross-check");
        let header = [1u8, 0, ciphertext.len() as u8];

        let mut direct = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).unwrap();
        direct.update(&header);
        direct.update(&ciphertext);
        let expected: [u8; MAC_LEN] = direct.finalize().into_bytes().into();
        assert_eq!(cipher.tag(&header, &ciphertext), expected);
    }

    #[test]
    fn different_keys_differ() {
        let a = RecordCipher::new(&RecordKey::from_bytes(&[1u8; 16]).unwrap());
        let b = RecordCipher::new(&RecordKey::from_bytes(&[2u8; 16]).unwrap());
        let sealed = a.seal(b"payload");
        assert_ne!(sealed, b.seal(b"payload"));
        // The wrong key either trips the padding check or yields garbage.
        if let Ok(opened) = b.open(&sealed) {
            assert_ne!(opened, b"payload");
        }
    }
}
