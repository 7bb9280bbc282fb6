//! Port sequences and the shared sequence file.
//!
//! Wire format of the sequence file: exactly three decimal ports separated by
//! a comma and a space, e.g. `41223, 9981, 63004`. Parsing tolerates extra
//! whitespace and a trailing newline.

use std::{
    fmt,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::SequenceError;

/// Number of ports in a sequence; fixed by the receiving firewall module.
pub const SEQUENCE_LEN: usize = 3;

/// An ordered port triple. Order is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sequence([u16; SEQUENCE_LEN]);

impl Sequence {
    /// Wrap three ports.
    pub fn new(ports: [u16; SEQUENCE_LEN]) -> Self {
        Self(ports)
    }

    /// Ports in knock order.
    pub fn ports(&self) -> &[u16; SEQUENCE_LEN] {
        &self.0
    }

    /// Iterate ports in knock order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}, {b}, {c}")
    }
}

impl FromStr for Sequence {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(',').map(str::trim).collect();
        if fields.len() != SEQUENCE_LEN {
            let actual = if s.trim().is_empty() { 0 } else { fields.len() };
            return Err(SequenceError::WrongLength { expected: SEQUENCE_LEN, actual });
        }

        let mut ports = [0u16; SEQUENCE_LEN];
        for (slot, field) in ports.iter_mut().zip(&fields) {
            *slot = field.parse().map_err(|_| SequenceError::InvalidPort((*field).to_string()))?;
        }
        Ok(Self(ports))
    }
}

impl From<[u16; SEQUENCE_LEN]> for Sequence {
    fn from(ports: [u16; SEQUENCE_LEN]) -> Self {
        Self(ports)
    }
}

/// Plaintext file holding the most recently published open sequence.
///
/// Written by the server (or by a lightweight client after a remote fetch)
/// and read by whoever knocks next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFile {
    path: PathBuf,
}

impl SequenceFile {
    /// Sequence file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the current sequence.
    pub fn read(&self) -> Result<Sequence, SequenceError> {
        let text = fs::read_to_string(&self.path).map_err(|e| self.io_error(&e))?;
        text.parse()
    }

    /// Replace the file contents with `sequence`.
    ///
    /// Written to a sibling temporary file, synced, then renamed over the
    /// target so a concurrent reader never observes a partial sequence.
    pub fn write(&self, sequence: &Sequence) -> Result<(), SequenceError> {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let mut file = File::create(&staging).map_err(|e| self.io_error(&e))?;
        file.write_all(sequence.to_string().as_bytes()).map_err(|e| self.io_error(&e))?;
        file.sync_all().map_err(|e| self.io_error(&e))?;
        drop(file);

        fs::rename(&staging, &self.path).map_err(|e| self.io_error(&e))?;
        tracing::debug!(path = %self.path.display(), "sequence file updated");
        Ok(())
    }

    fn io_error(&self, err: &std::io::Error) -> SequenceError {
        SequenceError::Io { path: self.path.display().to_string(), reason: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_comma_space() {
        assert_eq!(Sequence::new([41223, 9981, 63004]).to_string(), "41223, 9981, 63004");
    }

    #[test]
    fn parse_accepts_wire_format() {
        let sequence: Sequence = "41223, 9981, 63004".parse().unwrap();
        assert_eq!(sequence.ports(), &[41223, 9981, 63004]);
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let sequence: Sequence = "  1,2 ,   3\n".parse().unwrap();
        assert_eq!(sequence.ports(), &[1, 2, 3]);
    }

    #[test]
    fn parse_rejects_wrong_count() {
        assert_eq!(
            "1, 2".parse::<Sequence>(),
            Err(SequenceError::WrongLength { expected: 3, actual: 2 })
        );
        assert_eq!(
            "1, 2, 3, 4".parse::<Sequence>(),
            Err(SequenceError::WrongLength { expected: 3, actual: 4 })
        );
        assert_eq!(
            "".parse::<Sequence>(),
            Err(SequenceError::WrongLength { expected: 3, actual: 0 })
        );
    }

    #[test]
    fn parse_rejects_non_ports() {
        assert_eq!(
            "1, 70000, 3".parse::<Sequence>(),
            Err(SequenceError::InvalidPort("70000".to_string()))
        );
        assert_eq!(
            "1, -2, 3".parse::<Sequence>(),
            Err(SequenceError::InvalidPort("-2".to_string()))
        );
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = SequenceFile::new(dir.path().join("open_sequence"));

        file.write(&Sequence::new([100, 200, 300])).unwrap();

        assert_eq!(file.read().unwrap(), Sequence::new([100, 200, 300]));
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "100, 200, 300");
    }

    #[test]
    fn write_replaces_previous_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let file = SequenceFile::new(dir.path().join("open_sequence"));

        file.write(&Sequence::new([1, 2, 3])).unwrap();
        file.write(&Sequence::new([4, 5, 6])).unwrap();

        assert_eq!(file.read().unwrap(), Sequence::new([4, 5, 6]));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = SequenceFile::new(dir.path().join("absent"));

        assert!(matches!(file.read(), Err(SequenceError::Io { .. })));
    }
}
