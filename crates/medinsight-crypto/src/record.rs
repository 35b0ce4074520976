//! Encryption at rest for medical record fields.
//!
//! Diagnoses are stored only as ciphertext. A [`RecordCipher`] is built once
//! from the configured secret and shared; plaintext exists only for the
//! duration of a successful access-code redemption.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// HKDF info string for the record key.
const HKDF_INFO: &[u8] = b"medinsight-record-key-v1";

/// HKDF salt for domain separation (recommended by RFC 5869).
const HKDF_SALT: &[u8] = b"medinsight-record-hkdf-salt-v1";

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// A sealed field as persisted in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRecord {
    /// Ciphertext including the 16-byte Poly1305 tag.
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
}

impl SealedRecord {
    /// Rebuild from stored columns, checking the nonce width.
    pub fn from_parts(ciphertext: Vec<u8>, nonce: &[u8]) -> Result<Self, CryptoError> {
        let nonce: [u8; NONCE_SIZE] =
            nonce
                .try_into()
                .map_err(|_| CryptoError::InvalidNonceLength {
                    expected: NONCE_SIZE,
                    actual: nonce.len(),
                })?;
        Ok(Self { ciphertext, nonce })
    }

    /// Hex form of the nonce, for diagnostics.
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce)
    }
}

/// Symmetric cipher for record fields.
pub struct RecordCipher {
    cipher: ChaCha20Poly1305,
}

impl RecordCipher {
    /// Derive the record key from an application secret.
    pub fn from_secret(secret: &[u8]) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret);
        let mut key_bytes = [0u8; 32];
        hk.expand(HKDF_INFO, &mut key_bytes)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        key_bytes.zeroize();

        Ok(Self { cipher })
    }

    /// Encrypt a text field under a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<SealedRecord, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(SealedRecord { ciphertext, nonce })
    }

    /// Decrypt a sealed text field.
    pub fn open(&self, sealed: &SealedRecord) -> Result<String, CryptoError> {
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| {
            e.into_bytes().zeroize();
            CryptoError::InvalidUtf8
        })
    }
}

impl std::fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cipher() -> RecordCipher {
        RecordCipher::from_secret(b"test-record-secret").unwrap()
    }

    #[test]
    fn seal_then_open_returns_plaintext() {
        let c = cipher();
        let sealed = c.seal("Type 2 diabetes").unwrap();
        assert_ne!(sealed.ciphertext, b"Type 2 diabetes");
        assert_eq!(c.open(&sealed).unwrap(), "Type 2 diabetes");
    }

    #[test]
    fn same_plaintext_gets_distinct_nonces() {
        let c = cipher();
        let a = c.seal("hypertension").unwrap();
        let b = c.seal("hypertension").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_secret_fails_to_open() {
        let sealed = cipher().seal("asthma").unwrap();
        let other = RecordCipher::from_secret(b"another-secret").unwrap();
        assert!(matches!(
            other.open(&sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let c = cipher();
        let mut sealed = c.seal("fracture").unwrap();
        sealed.ciphertext[0] ^= 0xFF;
        assert!(c.open(&sealed).is_err());
    }

    #[test]
    fn from_parts_checks_nonce_width() {
        let err = SealedRecord::from_parts(vec![1, 2, 3], &[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidNonceLength {
                expected: 12,
                actual: 8
            }
        ));

        let ok = SealedRecord::from_parts(vec![1], &[7u8; 12]).unwrap();
        assert_eq!(ok.nonce_hex(), "07".repeat(12));
    }
}
