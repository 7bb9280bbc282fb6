//! Plaintext in-memory ledger.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use knockchain_crypto::HexDigest;

use super::LedgerStore;
use crate::error::LedgerError;

/// In-memory ledger for tests, simulation and ledger-free sequence sources.
///
/// Stores plaintext entries; there is no file to protect. Clones share the
/// same history, so a test can keep a handle while the deriver owns another.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    entries: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryLedger {
    /// Create a new empty `MemoryLedger`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger holding `entries`, e.g. to replay a captured history.
    pub fn with_entries(entries: Vec<Vec<u8>>) -> Self {
        Self { entries: Arc::new(Mutex::new(entries)) }
    }

    /// Number of entries.
    pub fn entry_count(&self) -> usize {
        self.lock().len()
    }

    /// Snapshot of all entries.
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.lock().clone()
    }

    // Appends are single pushes, so a poisoned history is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryLedger {
    fn read_entries(&self) -> Result<Vec<Vec<u8>>, LedgerError> {
        Ok(self.snapshot())
    }

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.lock().is_empty())
    }

    fn append(&mut self, digest: &HexDigest) -> Result<(), LedgerError> {
        self.lock().push(digest.as_bytes().to_vec());
        Ok(())
    }
}
