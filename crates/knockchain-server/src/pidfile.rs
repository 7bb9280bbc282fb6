//! Process identity bookkeeping.
//!
//! The pid file doubles as the daemon's single-instance guard: it is held
//! under an exclusive advisory lock for the daemon's lifetime, so a stale
//! file left behind by a crash never blocks a restart, while a live daemon
//! always does.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use fs2::FileExt;

use crate::error::PidFileError;

/// Locked pid file, removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    _file: File,
    pid: u32,
}

impl PidFile {
    /// Lock `path` and record the current process id in it.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if another process holds the lock
    /// - `Io` if the file cannot be created or written
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, PidFileError> {
        Self::acquire_as(path, std::process::id())
    }

    fn acquire_as(path: impl Into<PathBuf>, pid: u32) -> Result<Self, PidFileError> {
        let path = path.into();
        let io_error = |e: &io::Error| PidFileError::Io {
            path: path.clone(),
            reason: e.to_string(),
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_error(&e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                let holder = read_pid(&mut file);
                return Err(PidFileError::AlreadyRunning { path, pid: holder });
            }
            return Err(io_error(&e));
        }

        file.set_len(0).map_err(|e| io_error(&e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| io_error(&e))?;
        file.write_all(format!("{pid}\n").as_bytes()).map_err(|e| io_error(&e))?;
        file.sync_data().map_err(|e| io_error(&e))?;

        tracing::debug!(path = %path.display(), pid, "pid file acquired");
        Ok(Self { path, _file: file, pid })
    }

    /// Pid file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Removed while still locked; the lock goes with the handle.
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "cannot remove pid file");
        }
    }
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut text = String::new();
    file.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}
