//! Ledger entry encryption using `XChaCha20-Poly1305`
//!
//! All functions are pure - nonces must be provided by the caller.
//! This keeps the ledger deterministic under test environments.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Required ledger password length in bytes
pub const LEDGER_KEY_SIZE: usize = 8;

/// `XChaCha20` nonce size (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Bytes added to every sealed entry: nonce prefix plus authentication tag
pub const SEALED_OVERHEAD: usize = NONCE_SIZE + POLY1305_TAG_SIZE;

/// Label used for ledger key expansion
const LEDGER_KEY_LABEL: &[u8] = b"knockchainLedgerV1";

/// Cipher bound to one ledger password.
///
/// Holds the expanded 256-bit key; the password itself is not retained.
pub struct LedgerCipher {
    key: [u8; 32],
}

impl LedgerCipher {
    /// Expand a ledger password into a cipher key.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength`: password is not exactly [`LEDGER_KEY_SIZE`] bytes
    pub fn new(password: &[u8]) -> Result<Self, CryptoError> {
        if password.len() != LEDGER_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: LEDGER_KEY_SIZE,
                actual: password.len(),
            });
        }

        let hkdf = Hkdf::<Sha256>::new(None, password);
        let mut key = [0u8; 32];
        let Ok(()) = hkdf.expand(LEDGER_KEY_LABEL, &mut key) else {
            unreachable!("32 bytes is a valid HKDF-SHA256 output length");
        };

        Ok(Self { key })
    }

    /// Seal `plaintext` under `nonce`.
    ///
    /// Output layout: `nonce (24) || ciphertext || tag (16)`.
    ///
    /// # Security
    ///
    /// Caller MUST NOT reuse a nonce under the same password; production
    /// callers draw it from the OS RNG.
    pub fn seal(&self, plaintext: &[u8], nonce: [u8; NONCE_SIZE]) -> Vec<u8> {
        let cipher = XChaCha20Poly1305::new((&self.key).into());

        let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext) else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        sealed
    }

    /// Open an entry produced by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed`: entry shorter than [`SEALED_OVERHEAD`], or the
    ///   authentication tag does not verify (wrong password or tampering)
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SEALED_OVERHEAD {
            return Err(CryptoError::DecryptionFailed {
                reason: format!(
                    "entry too short: {} bytes, need at least {SEALED_OVERHEAD}",
                    sealed.len()
                ),
            });
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = XChaCha20Poly1305::new((&self.key).into());

        cipher.decrypt(XNonce::from_slice(nonce), ciphertext).map_err(|_| {
            CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
        })
    }
}

// Implement Drop to zeroize key material
impl Drop for LedgerCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Encrypt `plaintext` with a ledger password.
///
/// # Errors
///
/// - `InvalidKeyLength`: `key` is not exactly [`LEDGER_KEY_SIZE`] bytes
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8],
    nonce: [u8; NONCE_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    Ok(LedgerCipher::new(key)?.seal(plaintext, nonce))
}

/// Decrypt an entry sealed with [`encrypt`].
///
/// # Errors
///
/// - `InvalidKeyLength`: `key` is not exactly [`LEDGER_KEY_SIZE`] bytes
/// - `DecryptionFailed`: wrong key, truncated or tampered entry
pub fn decrypt(sealed: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    LedgerCipher::new(key)?.open(sealed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"p4ssw0rd";

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let sealed = encrypt(b"digest", KEY, [0xAB; NONCE_SIZE]).unwrap();
        assert_eq!(decrypt(&sealed, KEY).unwrap(), b"digest");
    }

    #[test]
    fn encrypt_decrypt_empty_entry() {
        let sealed = encrypt(b"", KEY, [0x00; NONCE_SIZE]).unwrap();
        assert_eq!(sealed.len(), SEALED_OVERHEAD);
        assert_eq!(decrypt(&sealed, KEY).unwrap(), b"");
    }

    #[test]
    fn sealed_entry_carries_nonce_prefix() {
        let nonce = [0x5A; NONCE_SIZE];
        let sealed = encrypt(b"abc", KEY, nonce).unwrap();
        assert_eq!(&sealed[..NONCE_SIZE], &nonce);
        assert_eq!(sealed.len(), 3 + SEALED_OVERHEAD);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let sealed = encrypt(b"secret digest", KEY, [0x00; NONCE_SIZE]).unwrap();

        let result = decrypt(&sealed, b"p4ssw0rD");
        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("authentication")
        ));
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        let sealed = encrypt(b"digest", KEY, [0x00; NONCE_SIZE]).unwrap();

        assert_eq!(
            decrypt(&sealed, b"short"),
            Err(CryptoError::InvalidKeyLength { expected: LEDGER_KEY_SIZE, actual: 5 })
        );
        assert_eq!(
            encrypt(b"digest", b"much-too-long", [0x00; NONCE_SIZE]),
            Err(CryptoError::InvalidKeyLength { expected: LEDGER_KEY_SIZE, actual: 13 })
        );
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let mut sealed = encrypt(b"original digest", KEY, [0x00; NONCE_SIZE]).unwrap();
        sealed[NONCE_SIZE] ^= 0xFF;

        assert!(decrypt(&sealed, KEY).is_err());
    }

    #[test]
    fn truncated_entry_fails_decryption() {
        let sealed = encrypt(b"digest", KEY, [0x00; NONCE_SIZE]).unwrap();
        assert!(decrypt(&sealed[..SEALED_OVERHEAD - 1], KEY).is_err());
    }

    #[test]
    fn different_nonces_produce_different_ciphertexts() {
        let a = encrypt(b"digest", KEY, [0x00; NONCE_SIZE]).unwrap();
        let b = encrypt(b"digest", KEY, [0xFF; NONCE_SIZE]).unwrap();
        assert_ne!(a[NONCE_SIZE..], b[NONCE_SIZE..]);
    }
}
