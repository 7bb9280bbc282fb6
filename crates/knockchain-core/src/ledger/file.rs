//! Encrypted, durable, single-writer ledger file.
//!
//! # On-disk format
//!
//! A sequence of frames with no file header:
//!
//! ```text
//! [len: u32 BE][sealed entry: len bytes]
//! [len: u32 BE][sealed entry: len bytes]
//! ...
//! ```
//!
//! Each sealed entry is `nonce || ciphertext || tag` from
//! [`LedgerCipher::seal`]. Earlier releases wrote unframed ciphertext back to
//! back; those files cannot be read by this format.

use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use knockchain_crypto::{HexDigest, LedgerCipher, NONCE_SIZE};

use super::LedgerStore;
use crate::{
    config::LedgerPassword,
    env::Environment,
    error::{ConfigError, Error, LedgerError},
};

/// Largest accepted sealed entry. A digest entry is well under this; anything
/// bigger is a corrupt length prefix.
pub const MAX_ENTRY_LEN: u32 = 4096;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Ledger stored in a local file, one sealed frame per entry.
///
/// Holds an exclusive advisory lock on the file for its whole lifetime. A
/// second `FileLedger` on the same path, in this or any other process, fails
/// with [`LedgerError::Locked`] until this one is dropped.
pub struct FileLedger<E: Environment> {
    path: PathBuf,
    file: File,
    cipher: LedgerCipher,
    env: E,
}

impl<E: Environment> FileLedger<E> {
    /// Open an existing ledger file.
    ///
    /// The password is turned into a cipher before the file is touched, so a
    /// bad password fails without I/O.
    ///
    /// # Errors
    ///
    /// - `Config`: the password cannot key the cipher
    /// - `Ledger(NotFound)`: no file at `path`
    /// - `Ledger(Locked)`: another writer holds the ledger
    pub fn open(
        path: impl Into<PathBuf>,
        password: &LedgerPassword,
        env: E,
    ) -> Result<Self, Error> {
        let path = path.into();
        let cipher = LedgerCipher::new(password.as_bytes()).map_err(ConfigError::from)?;

        let file = OpenOptions::new().read(true).append(true).open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                LedgerError::NotFound(path.display().to_string())
            } else {
                LedgerError::from(e)
            }
        })?;

        Self::lock(&file, &path)?;
        tracing::debug!(path = %path.display(), "ledger opened");
        Ok(Self { path, file, cipher, env })
    }

    /// Open the ledger at `path`, creating an empty file if none exists.
    ///
    /// An existing file is opened as-is, never truncated.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open), except a missing file is not an error.
    pub fn create(
        path: impl Into<PathBuf>,
        password: &LedgerPassword,
        env: E,
    ) -> Result<Self, Error> {
        let path = path.into();
        let cipher = LedgerCipher::new(password.as_bytes()).map_err(ConfigError::from)?;

        let mut options = OpenOptions::new();
        options.read(true).append(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path).map_err(LedgerError::from)?;

        Self::lock(&file, &path)?;
        tracing::debug!(path = %path.display(), "ledger created or reopened");
        Ok(Self { path, file, cipher, env })
    }

    /// Ledger file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(file: &File, path: &Path) -> Result<(), LedgerError> {
        file.try_lock_exclusive().map_err(|e| {
            let contended = e.kind() == ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if contended {
                LedgerError::Locked(path.display().to_string())
            } else {
                LedgerError::from(e)
            }
        })
    }

    fn read_raw(&self) -> Result<Vec<u8>, LedgerError> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        Ok(raw)
    }
}

impl<E: Environment> LedgerStore for FileLedger<E> {
    fn read_entries(&self) -> Result<Vec<Vec<u8>>, LedgerError> {
        let raw = self.read_raw()?;
        let mut entries = Vec::new();
        let mut offset = 0usize;

        while offset < raw.len() {
            let truncated = LedgerError::Truncated { offset: offset as u64 };

            let prefix: [u8; LENGTH_PREFIX_SIZE] = raw
                .get(offset..offset + LENGTH_PREFIX_SIZE)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| truncated.clone())?;
            let len = u32::from_be_bytes(prefix);
            if len > MAX_ENTRY_LEN {
                return Err(LedgerError::EntryTooLarge { offset: offset as u64, len });
            }

            let start = offset + LENGTH_PREFIX_SIZE;
            let end = start + len as usize;
            let sealed = raw.get(start..end).ok_or(truncated)?;

            let plaintext = self.cipher.open(sealed).map_err(|e| LedgerError::Decryption {
                index: entries.len(),
                reason: e.to_string(),
            })?;
            entries.push(plaintext);
            offset = end;
        }

        tracing::debug!(entries = entries.len(), "ledger read");
        Ok(entries)
    }

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.file.metadata()?.len() == 0)
    }

    fn append(&mut self, digest: &HexDigest) -> Result<(), LedgerError> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);
        let sealed = self.cipher.seal(digest.as_bytes(), nonce);

        let len = u32::try_from(sealed.len())
            .ok()
            .filter(|&len| len <= MAX_ENTRY_LEN)
            .ok_or(LedgerError::EntryTooLarge { offset: 0, len: u32::MAX })?;

        let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + sealed.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&sealed);

        // Single write so a crash leaves at most one torn frame at the tail.
        (&self.file).write_all(&frame)?;
        self.file.sync_data()?;

        tracing::debug!(digest = ?digest, "ledger entry appended");
        Ok(())
    }
}
