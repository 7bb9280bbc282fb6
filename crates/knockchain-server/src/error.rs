//! Server error types.
//!
//! Split by how the daemon reacts to them:
//! - [`DaemonError`]: fatal, the scheduler stops and the process exits
//!   non-zero
//! - [`ReloadError`]: the sequence is already published, so the failure is
//!   logged and the schedule continues
//! - [`PidFileError`]: raised before the scheduler ever starts

use std::path::PathBuf;

use knockchain_core::{Error as CoreError, SequenceError};
use thiserror::Error;

/// Errors that stop the daemon.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaemonError {
    /// Ledger, configuration or derivation failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Sequence file could not be published
    #[error("cannot publish sequence: {0}")]
    Publish(#[from] SequenceError),

    /// Pid file could not be acquired
    #[error(transparent)]
    PidFile(#[from] PidFileError),

    /// Unusable scheduler settings
    #[error("invalid daemon configuration: {0}")]
    InvalidConfig(String),
}

/// Firewall configuration or service restart failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReloadError {
    /// Rendered knockd configuration could not be written
    #[error("cannot write {path}: {reason}")]
    Write {
        /// Configuration file
        path: PathBuf,
        /// I/O failure
        reason: String,
    },

    /// Service command could not be started
    #[error("cannot run `{command}`: {reason}")]
    Spawn {
        /// Command line
        command: String,
        /// Spawn failure
        reason: String,
    },

    /// Service command ran and failed
    #[error("`{command}` failed with status {status:?}")]
    Failed {
        /// Command line
        command: String,
        /// Exit status, `None` when killed by a signal
        status: Option<i32>,
    },
}

/// Pid file errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PidFileError {
    /// Another live daemon holds the pid file
    #[error("pid file {path} is held by a running daemon (pid {pid:?})")]
    AlreadyRunning {
        /// Pid file
        path: PathBuf,
        /// Pid recorded by the holder, when readable
        pid: Option<u32>,
    },

    /// Pid file could not be created or written
    #[error("pid file {path}: {reason}")]
    Io {
        /// Pid file
        path: PathBuf,
        /// I/O failure
        reason: String,
    },
}
