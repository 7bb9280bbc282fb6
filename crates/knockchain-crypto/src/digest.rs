//! Salted SHA-512 digests and hex reduction

use std::{fmt, num::NonZeroU64};

use sha2::{Digest, Sha512};

use crate::error::CryptoError;

/// Length of a rendered digest (SHA-512 as lowercase hex)
pub const DIGEST_HEX_LEN: usize = 128;

/// A salted digest rendered as lowercase hexadecimal.
///
/// The hex rendering is what gets chained and stored in the ledger, so two
/// digests are equal exactly when their strings are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HexDigest(String);

impl HexDigest {
    /// Parse a stored digest.
    ///
    /// Accepts upper- or lower-case input and normalizes to lowercase.
    ///
    /// # Errors
    ///
    /// - `InvalidHex`: a non-hex character
    /// - `InvalidDigestLength`: a length other than [`DIGEST_HEX_LEN`]
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        if let Some((position, character)) =
            hex.char_indices().find(|(_, c)| !c.is_ascii_hexdigit())
        {
            return Err(CryptoError::InvalidHex { position, character });
        }
        if hex.len() != DIGEST_HEX_LEN {
            return Err(CryptoError::InvalidDigestLength {
                expected: DIGEST_HEX_LEN,
                actual: hex.len(),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Hex string view.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex string as bytes, the form fed into the next chained digest.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Reduce the digest, read as a big-endian integer, modulo `modulus`.
    pub fn reduce(&self, modulus: NonZeroU64) -> u64 {
        fold_hex(self.as_bytes(), modulus.get())
    }
}

impl fmt::Display for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests are long and double as ledger state
        write!(f, "HexDigest({}..)", self.0.get(..16).unwrap_or(&self.0))
    }
}

/// Salted digest: SHA-512 over `salt || data`.
///
/// Deterministic; the salt is a deployment-wide secret so an observer without
/// it cannot precompute the chain.
pub fn hash(data: &[u8], salt: &[u8]) -> HexDigest {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(data);
    HexDigest(hex::encode(hasher.finalize()))
}

/// Interpret `hex` as a big-endian unsigned integer and reduce it modulo
/// `modulus`.
///
/// Equivalent to `int(hex, 16) % modulus` for inputs of any length; the fold
/// keeps the accumulator below the modulus so no big-integer type is needed.
/// An empty string is zero.
///
/// # Errors
///
/// - `ZeroModulus`: `modulus` is zero
/// - `InvalidHex`: `hex` contains a non-hex character
pub fn hex_to_int_mod(hex: &str, modulus: u64) -> Result<u64, CryptoError> {
    let Some(modulus) = NonZeroU64::new(modulus) else {
        return Err(CryptoError::ZeroModulus);
    };
    if let Some((position, character)) = hex.char_indices().find(|(_, c)| !c.is_ascii_hexdigit())
    {
        return Err(CryptoError::InvalidHex { position, character });
    }
    Ok(fold_hex(hex.as_bytes(), modulus.get()))
}

/// Caller guarantees every byte is an ASCII hex digit and `modulus > 0`.
fn fold_hex(digits: &[u8], modulus: u64) -> u64 {
    let modulus = u128::from(modulus);
    let acc = digits.iter().fold(0u128, |acc, &digit| {
        let value = match digit {
            b'0'..=b'9' => digit - b'0',
            b'a'..=b'f' => digit - b'a' + 10,
            b'A'..=b'F' => digit - b'A' + 10,
            _ => unreachable!("digits validated as ASCII hex"),
        };
        (acc * 16 + u128::from(value)) % modulus
    });
    acc as u64
}
