//! Configuration objects for sequence derivation.
//!
//! Built once from the command line (or tests) and handed to constructors.
//! Secrets redact themselves in `Debug` output so they never reach logs.

use std::fmt;

use knockchain_crypto::LEDGER_KEY_SIZE;
use zeroize::Zeroize;

use crate::{error::ConfigError, ports::PortSpace, sequence::Sequence};

/// Deployment-wide secret mixed into every digest.
///
/// Shared out-of-band between client and server; never rotated by the
/// system.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt(String);

impl Salt {
    /// Wrap a salt string.
    ///
    /// # Errors
    ///
    /// - `EmptySalt`: the salt is empty
    pub fn new(salt: impl Into<String>) -> Result<Self, ConfigError> {
        let salt = salt.into();
        if salt.is_empty() {
            return Err(ConfigError::EmptySalt);
        }
        Ok(Self(salt))
    }

    /// Salt bytes as fed to the digest.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt(<{} bytes>)", self.0.len())
    }
}

impl Drop for Salt {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Symmetric ledger password, exactly [`LEDGER_KEY_SIZE`] bytes.
///
/// Distinct from the salt: the salt shapes the chain, the password only
/// guards the ledger file at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct LedgerPassword(String);

impl LedgerPassword {
    /// Validate and wrap a password.
    ///
    /// # Errors
    ///
    /// - `PasswordLength`: not exactly [`LEDGER_KEY_SIZE`] bytes
    pub fn new(password: impl Into<String>) -> Result<Self, ConfigError> {
        let mut password = password.into();
        if password.len() != LEDGER_KEY_SIZE {
            let actual = password.len();
            password.zeroize();
            return Err(ConfigError::PasswordLength { expected: LEDGER_KEY_SIZE, actual });
        }
        Ok(Self(password))
    }

    /// Password bytes as fed to the ledger cipher.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for LedgerPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LedgerPassword(<redacted>)")
    }
}

impl Drop for LedgerPassword {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Where the next open sequence comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SequenceSource {
    /// Ledger-backed chained derivation. Reproducible on both ends; advances
    /// the ledger on every call.
    #[default]
    Chained,

    /// Uniform random ports. Never touches the ledger and is not
    /// reproducible; for ephemeral or manual sequences only.
    Random,

    /// Fixed operator-supplied sequence. Never touches the ledger.
    Static(Sequence),
}

/// Everything the deriver needs besides its ledger and environment.
#[derive(Debug, Clone)]
pub struct DerivationConfig {
    /// Shared salt
    pub salt: Salt,
    /// Port bounds and exclusions
    pub port_space: PortSpace,
    /// Sequence source
    pub source: SequenceSource,
}

impl DerivationConfig {
    /// Chained derivation over the default port space.
    pub fn chained(salt: Salt) -> Self {
        Self { salt, port_space: PortSpace::default(), source: SequenceSource::Chained }
    }

    /// Validate all settings.
    ///
    /// # Errors
    ///
    /// - `InvalidPortBounds`: see [`PortSpace::validate`]
    /// - `Invalid`: a static sequence uses a port outside the port space
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.port_space.validate()?;
        if let SequenceSource::Static(sequence) = &self.source {
            if let Some(port) = sequence.iter().find(|&port| !self.port_space.contains(port)) {
                return Err(ConfigError::Invalid {
                    field: "open sequence",
                    reason: format!("port {port} is outside the configured port space"),
                });
            }
        }
        Ok(())
    }
}
