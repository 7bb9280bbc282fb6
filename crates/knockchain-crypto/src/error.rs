//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from digest, reduction and cipher operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid key material length
    ///
    /// The ledger password must be exactly [`crate::LEDGER_KEY_SIZE`] bytes.
    /// Checked before any cipher work so a truncated or padded password can
    /// never decrypt into plausible plaintext.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Decryption failed (authentication tag mismatch or malformed entry)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Input is not a hexadecimal string
    #[error("invalid hex digit {character:?} at position {position}")]
    InvalidHex {
        /// Byte offset of the offending character
        position: usize,
        /// The offending character
        character: char,
    },

    /// Stored digest has the wrong length
    #[error("invalid digest length: expected {expected} hex characters, got {actual}")]
    InvalidDigestLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Reduction modulus was zero
    #[error("modulus must be non-zero")]
    ZeroModulus,
}

impl CryptoError {
    /// Returns true if this error stems from configuration rather than data.
    ///
    /// Configuration errors (wrong key length, zero modulus) are detected
    /// before touching any stored bytes. Everything else indicates the
    /// data itself is wrong or was sealed under a different key.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::InvalidKeyLength { .. } | Self::ZeroModulus => true,
            Self::DecryptionFailed { .. }
            | Self::InvalidHex { .. }
            | Self::InvalidDigestLength { .. } => false,
        }
    }
}
