//! Client error types.
//!
//! A lost or refused knock is not an error at all: it is reported as a
//! [`crate::KnockOutcome`] and logged. Only failures that mean nothing (or
//! not everything) was attempted surface here.

use knockchain_core::{ConfigError, SequenceError};
use thiserror::Error;

/// Knock transmission errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KnockError {
    /// Target host could not be resolved; nothing was sent
    #[error("cannot resolve {host}: {reason}")]
    Resolve {
        /// Host as configured
        host: String,
        /// Resolver failure
        reason: String,
    },

    /// Operator aborted the manual close trigger; close burst not sent
    #[error("close trigger aborted, close sequence was not sent")]
    Aborted,

    /// Reading the manual close trigger failed
    #[error("close trigger failed: {0}")]
    Prompt(String),

    /// Unusable transmission settings
    #[error("invalid knock configuration: {0}")]
    InvalidConfig(String),
}

/// Remote sequence fetch errors.
///
/// Connection, authentication and parse failures stay distinct so callers
/// can retry authentication and degrade everything else to manual entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFetchError {
    /// Invalid fetch configuration
    #[error("invalid remote configuration: {0}")]
    Config(#[from] ConfigError),

    /// TCP connect, handshake or host key verification failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// Server rejected the credentials
    #[error("authentication failed after {attempts} attempt(s)")]
    Authentication {
        /// Attempts made
        attempts: u32,
    },

    /// Remote OS is not one we know how to read files on
    #[error("unsupported remote operating system: {0}")]
    UnsupportedOs(String),

    /// Remote path cannot be expressed safely in a command
    #[error("remote path cannot be quoted safely: {0}")]
    InvalidPath(String),

    /// Remote command ran but failed
    #[error("remote command `{command}` exited with status {status}: {stderr}")]
    Command {
        /// Command line sent
        command: String,
        /// Exit status
        status: i32,
        /// Captured stderr
        stderr: String,
    },

    /// Remote file content is not a sequence
    #[error("remote sequence is malformed: {0}")]
    Parse(SequenceError),

    /// Fetched sequence could not be stored locally
    #[error("cannot store fetched sequence: {0}")]
    LocalWrite(SequenceError),
}

impl RemoteFetchError {
    /// Returns true if retrying with other credentials may help.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
