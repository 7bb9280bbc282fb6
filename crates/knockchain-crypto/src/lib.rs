//! Knockchain Cryptographic Primitives
//!
//! Building blocks shared by the ledger and the sequence deriver. Pure
//! functions with deterministic outputs. Callers provide random bytes for
//! deterministic testing.
//!
//! # Chain Derivation
//!
//! Every digest is salted. The ledger content is folded into a single digest,
//! which is appended back to the ledger and then chained three more times to
//! produce the port candidates.
//!
//! ```text
//! Ledger plaintext
//!        │
//!        ▼
//! SHA-512(salt || content) → h0 (appended to ledger)
//!        │
//!        ▼
//! SHA-512(salt || h0) → h1 → h2 → h3
//!        │
//!        ▼
//! hex_to_int_mod → port candidates
//! ```
//!
//! # Ledger Confidentiality
//!
//! - The 8-byte ledger password is expanded with HKDF-SHA256 into a 256-bit
//!   key, zeroized on drop
//! - Each entry is sealed independently with XChaCha20-Poly1305 under a fresh
//!   24-byte nonce supplied by the caller
//! - A wrong password fails the authentication tag -> entry rejected, never
//!   returned as garbage plaintext
//! - A password of the wrong length is rejected before any cipher work

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cipher;
mod digest;
mod error;

pub use cipher::{
    LEDGER_KEY_SIZE, LedgerCipher, NONCE_SIZE, SEALED_OVERHEAD, decrypt, encrypt,
};
pub use digest::{DIGEST_HEX_LEN, HexDigest, hash, hex_to_int_mod};
pub use error::CryptoError;
