//! Append-only ledger of chain digests.
//!
//! Trait-based abstraction over where the history lives. The trait is
//! synchronous: every operation is a short blocking file access.
//!
//! # Invariants
//!
//! - Entries are only ever appended; existing bytes are never rewritten
//! - The ledger state consumed by derivation is the concatenation of every
//!   entry in append order, so every entry influences all later sequences
//! - Initialization writes exactly one seed entry, and only into an empty
//!   ledger

mod file;
mod memory;

pub use file::{FileLedger, MAX_ENTRY_LEN};
use knockchain_crypto::HexDigest;
pub use memory::MemoryLedger;

use crate::error::LedgerError;

/// Storage abstraction for the digest history.
pub trait LedgerStore {
    /// Decrypted entries in append order.
    ///
    /// # Errors
    ///
    /// Any entry that cannot be framed or decrypted fails the whole read;
    /// a partial history is never returned.
    fn read_entries(&self) -> Result<Vec<Vec<u8>>, LedgerError>;

    /// Full decrypted content: every entry concatenated in append order.
    fn read(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(self.read_entries()?.concat())
    }

    /// True if the ledger holds no entries.
    fn is_empty(&self) -> Result<bool, LedgerError>;

    /// Append one digest.
    ///
    /// # Invariants
    ///
    /// - Post: the entry is durable before this returns
    fn append(&mut self, digest: &HexDigest) -> Result<(), LedgerError>;

    /// Write the seed entry into an empty ledger.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized`: the ledger already has entries
    fn initialize(&mut self, seed: &HexDigest) -> Result<(), LedgerError> {
        if !self.is_empty()? {
            return Err(LedgerError::AlreadyInitialized);
        }
        self.append(seed)?;
        tracing::info!("ledger initialized with seed entry");
        Ok(())
    }
}
