//! Knockchain client.
//!
//! Two ways to obtain an open sequence, one way to send it:
//!
//! - Symmetric mode: derive locally with [`knockchain_core::SequenceDeriver`]
//!   from a ledger shared with the server
//! - Lightweight mode: [`RemoteSequenceFetcher`] reads the sequence the
//!   server already published, over SSH
//!
//! [`KnockTransmitter`] then sends the open burst, waits (or asks), and sends
//! the close burst.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod knock;
pub mod remote;

pub use error::{KnockError, RemoteFetchError};
pub use knock::{
    CloseMode, CycleReport, KnockConfig, KnockOutcome, KnockTransmitter, Knocker, TcpKnocker,
};
pub use remote::{
    CommandOutput, Credentials, RemoteConfig, RemoteConnector, RemoteOs, RemoteSequenceFetcher,
    RemoteSession, SshConnector, SshSession,
};
