//! Knockchain core.
//!
//! Everything both ends of a knock need to agree on a port sequence without
//! talking to each other first: the encrypted append-only ledger, the chained
//! sequence derivation over it, and the shared sequence file format.
//!
//! # Architecture
//!
//! Components take an explicit configuration object and their collaborators
//! (ledger store, environment, prompter) through constructors. Nothing reads
//! process-wide state.
//!
//! - [`ledger`]: [`LedgerStore`] trait with [`FileLedger`] (encrypted,
//!   durable, single-writer) and [`MemoryLedger`] (tests, simulation)
//! - [`SequenceDeriver`]: chained, random or static sequence sources
//! - [`Sequence`] / [`SequenceFile`]: the ordered port triple and its
//!   plaintext publication format
//! - [`Environment`]: randomness, wall clock and sleeping, with
//!   [`SystemEnv`] for production
//! - [`prompt`]: operator interaction behind the [`Prompter`] trait
//!
//! # Single Writer
//!
//! Exactly one process may derive (and therefore append) per logical cycle.
//! [`FileLedger`] enforces this with an exclusive advisory lock held for its
//! lifetime; a second writer fails fast with [`LedgerError::Locked`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
mod deriver;
pub mod env;
mod error;
pub mod ledger;
mod ports;
pub mod prompt;
mod salt;
mod sequence;
mod system_env;

pub use config::{DerivationConfig, LedgerPassword, Salt, SequenceSource};
pub use deriver::{ChainStep, SequenceDeriver, derive_from_content};
pub use env::Environment;
pub use error::{ConfigError, DerivationError, Error, LedgerError, SequenceError};
pub use ledger::{FileLedger, LedgerStore, MemoryLedger};
pub use ports::{DEFAULT_EXCLUDED_PORTS, MAX_PORT_LIMIT, PortSpace};
pub use prompt::{Prompter, ScriptedPrompter, TerminalPrompter};
pub use salt::{SALT_ALPHABET, generate_salt};
pub use sequence::{SEQUENCE_LEN, Sequence, SequenceFile};
pub use system_env::SystemEnv;
