//! Error types for the knockchain core.
//!
//! One enum per concern, mirroring how each failure must be handled:
//! - `ConfigError`: bad salt, password, port bounds or aborted prompts.
//!   Fatal, detected before any ledger I/O.
//! - `LedgerError`: missing, locked, truncated or undecryptable ledger.
//!   Fatal; the ledger never guesses at possibly-corrupt state.
//! - `DerivationError`: the exclusion set leaves no usable port. Fatal.
//! - `SequenceError`: malformed sequence text or sequence file I/O.
//!
//! [`Error`] wraps all of them so callers can use `?` across layers.

use knockchain_crypto::CryptoError;
use thiserror::Error;

/// Configuration errors. Always fatal, always raised before I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Salt is empty
    #[error("salt must not be empty")]
    EmptySalt,

    /// Ledger password has the wrong length
    #[error("ledger password must be exactly {expected} bytes, got {actual}")]
    PasswordLength {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// Port bounds are unusable
    #[error("invalid port bounds: min {min_port}, max {max_port} (need min < max <= 65536)")]
    InvalidPortBounds {
        /// Lower bound (inclusive)
        min_port: u32,
        /// Upper bound (exclusive)
        max_port: u32,
    },

    /// Seed passphrase is empty
    #[error("ledger passphrase must not be empty")]
    EmptyPassphrase,

    /// Operator aborted an interactive prompt (EOF)
    #[error("prompt aborted: {prompt}")]
    Aborted {
        /// What was being asked for
        prompt: String,
    },

    /// Reading from the terminal failed
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// Any other invalid setting
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the setting
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Ledger errors. Only a genuinely empty ledger is recoverable (by
/// initialization); everything else stops the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Ledger file does not exist
    #[error("ledger not found: {0}")]
    NotFound(String),

    /// Another process holds the ledger
    #[error("ledger is locked by another process: {0}")]
    Locked(String),

    /// Ledger has no entries and must be initialized first
    #[error("ledger is not initialized")]
    Uninitialized,

    /// Initialization attempted on a ledger that already has entries
    #[error("ledger is already initialized")]
    AlreadyInitialized,

    /// File ends inside a frame (torn or partial write)
    #[error("ledger truncated: incomplete entry at byte {offset}")]
    Truncated {
        /// Byte offset of the incomplete frame
        offset: u64,
    },

    /// Frame length prefix is implausible
    #[error("ledger entry at byte {offset} has implausible length {len}")]
    EntryTooLarge {
        /// Byte offset of the frame
        offset: u64,
        /// Declared length
        len: u32,
    },

    /// An entry failed to decrypt (wrong password or tampering)
    #[error("ledger entry {index} could not be decrypted: {reason}")]
    Decryption {
        /// Zero-based entry index
        index: usize,
        /// Underlying cipher failure
        reason: String,
    },

    /// Underlying I/O failure
    #[error("ledger I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

/// Sequence derivation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// Every port in the space is excluded, so the tie-break cannot end
    #[error("no usable port in [{min_port}, {max_port}): all values are excluded")]
    PortSpaceExhausted {
        /// Lower bound (inclusive)
        min_port: u32,
        /// Upper bound (exclusive)
        max_port: u32,
    },
}

/// Sequence parsing and sequence file errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// Wrong number of ports
    #[error("expected {expected} ports, got {actual}")]
    WrongLength {
        /// Required count
        expected: usize,
        /// Parsed count
        actual: usize,
    },

    /// A value is not a port number
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// Sequence file could not be read or written
    #[error("sequence file {path}: {reason}")]
    Io {
        /// File path
        path: String,
        /// I/O failure
        reason: String,
    },
}

/// Any core failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ledger error
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Derivation error
    #[error("derivation error: {0}")]
    Derivation(#[from] DerivationError),

    /// Sequence error
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),
}

impl From<CryptoError> for ConfigError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyLength { expected, actual } => {
                ConfigError::PasswordLength { expected, actual }
            },
            other => ConfigError::Invalid { field: "crypto", reason: other.to_string() },
        }
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        if err.is_configuration() {
            Error::Config(err.into())
        } else {
            Error::Ledger(LedgerError::Decryption { index: 0, reason: err.to_string() })
        }
    }
}

impl Error {
    /// Returns true if the operator can fix this by re-running `init`.
    ///
    /// Only an empty ledger qualifies. Corrupt, locked or undecryptable
    /// ledgers are never recoverable automatically.
    pub fn is_uninitialized_ledger(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::Uninitialized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_length_maps_to_configuration() {
        let err: Error = CryptoError::InvalidKeyLength { expected: 8, actual: 3 }.into();
        assert_eq!(err, Error::Config(ConfigError::PasswordLength { expected: 8, actual: 3 }));
    }

    #[test]
    fn decryption_failure_maps_to_ledger() {
        let err: Error = CryptoError::DecryptionFailed { reason: "tag".to_string() }.into();
        assert!(matches!(err, Error::Ledger(LedgerError::Decryption { .. })));
    }

    #[test]
    fn only_empty_ledger_is_recoverable() {
        assert!(Error::Ledger(LedgerError::Uninitialized).is_uninitialized_ledger());
        assert!(!Error::Ledger(LedgerError::Truncated { offset: 4 }).is_uninitialized_ledger());
        assert!(!Error::Config(ConfigError::EmptySalt).is_uninitialized_ledger());
    }

    #[test]
    fn error_display() {
        let err = LedgerError::Truncated { offset: 152 };
        assert_eq!(err.to_string(), "ledger truncated: incomplete entry at byte 152");

        let err = SequenceError::WrongLength { expected: 3, actual: 2 };
        assert_eq!(err.to_string(), "expected 3 ports, got 2");

        let err = DerivationError::PortSpaceExhausted { min_port: 0, max_port: 4 };
        assert_eq!(err.to_string(), "no usable port in [0, 4): all values are excluded");
    }
}
