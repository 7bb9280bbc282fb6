//! Knockchain server.
//!
//! The designated single writer of the shared ledger. Once per interval the
//! [`DaemonScheduler`] derives the next open sequence, publishes it to the
//! [`knockchain_core::SequenceFile`] read by lightweight clients, renders
//! the knockd configuration and restarts the firewall log parser through a
//! [`FirewallReloader`].
//!
//! [`PidFile`] keeps a second daemon from starting while one is alive.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod daemon;
mod error;
pub mod firewall;
mod pidfile;

pub use daemon::{
    CycleOutcome, DEFAULT_INTERVAL, DaemonConfig, DaemonScheduler, DaemonState, next_boundary,
};
pub use error::{DaemonError, PidFileError, ReloadError};
pub use firewall::{FirewallReloader, KnockdConfig, ServiceManager, ServiceReloader};
pub use pidfile::PidFile;
