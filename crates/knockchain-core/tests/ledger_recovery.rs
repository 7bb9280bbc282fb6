//! Recovery tests for `FileLedger`.
//!
//! These tests verify that chain state persists across close/reopen cycles
//! and that every kind of damaged or foreign ledger is refused rather than
//! silently accepted.

use std::{
    fs::OpenOptions,
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use knockchain_core::{
    DerivationConfig, Environment, Error, FileLedger, LedgerError, LedgerPassword, LedgerStore,
    Salt, SequenceDeriver,
};
use knockchain_crypto::{SEALED_OVERHEAD, decrypt, hash};
use tempfile::tempdir;

// Counter-based randomness so every nonce differs but runs are reproducible
#[derive(Clone, Default)]
struct TestEnv {
    counter: Arc<AtomicU64>,
}

impl Environment for TestEnv {
    fn wall_clock_secs(&self) -> u64 {
        1_700_000_000
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for chunk in buffer.chunks_mut(8) {
            let value = self.counter.fetch_add(1, Ordering::Relaxed).to_be_bytes();
            chunk.copy_from_slice(&value[..chunk.len()]);
        }
    }
}

// Digest hex (128) sealed, plus the u32 length prefix
const FRAME_LEN: u64 = 4 + 128 + SEALED_OVERHEAD as u64;

fn password() -> LedgerPassword {
    LedgerPassword::new("p4ssw0rd").unwrap()
}

fn deriver(ledger: FileLedger<TestEnv>) -> SequenceDeriver<FileLedger<TestEnv>, TestEnv> {
    let config = DerivationConfig::chained(Salt::new("S").unwrap());
    SequenceDeriver::new(config, ledger, TestEnv::default()).unwrap()
}

#[test]
fn test_chain_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");

    let first = {
        let ledger = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();
        let mut deriver = deriver(ledger);
        deriver.initialize("test-pass").unwrap();
        deriver.derive().unwrap()
    };

    // Reopen: the next step must match what an uninterrupted process computes
    let (expected_entries, second) = {
        let ledger = FileLedger::open(&path, &password(), TestEnv::default()).unwrap();
        assert_eq!(ledger.read_entries().unwrap().len(), 2);
        let mut deriver = deriver(ledger);
        let second = deriver.derive().unwrap();
        (deriver.ledger().read_entries().unwrap(), second)
    };

    assert_ne!(first, second);
    assert_eq!(expected_entries.len(), 3);
    assert_eq!(expected_entries[0], hash(b"test-pass", b"S").as_bytes());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * FRAME_LEN);
}

#[test]
fn test_wrong_password_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");
    {
        let mut ledger = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();
        ledger.append(&hash(b"test-pass", b"S")).unwrap();
    }

    let other = LedgerPassword::new("0therpwd").unwrap();
    let ledger = FileLedger::open(&path, &other, TestEnv::default()).unwrap();

    assert!(matches!(ledger.read(), Err(LedgerError::Decryption { index: 0, .. })));
}

#[test]
fn test_truncated_tail_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");
    {
        let mut ledger = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();
        ledger.append(&hash(b"test-pass", b"S")).unwrap();
    }

    // Torn length prefix after one good frame
    OpenOptions::new().append(true).open(&path).unwrap().write_all(&[0, 0]).unwrap();

    let ledger = FileLedger::open(&path, &password(), TestEnv::default()).unwrap();
    assert_eq!(ledger.read_entries(), Err(LedgerError::Truncated { offset: FRAME_LEN }));

    // Nothing was rewritten
    assert_eq!(std::fs::metadata(&path).unwrap().len(), FRAME_LEN + 2);
}

#[test]
fn test_torn_entry_body_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");
    {
        let mut ledger = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();
        ledger.append(&hash(b"test-pass", b"S")).unwrap();
    }

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&168u32.to_be_bytes()).unwrap();
    file.write_all(&[0xAB; 10]).unwrap();
    drop(file);

    let ledger = FileLedger::open(&path, &password(), TestEnv::default()).unwrap();
    assert_eq!(ledger.read_entries(), Err(LedgerError::Truncated { offset: FRAME_LEN }));
}

#[test]
fn test_tampered_entry_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");
    {
        let mut ledger = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();
        ledger.append(&hash(b"one", b"S")).unwrap();
        ledger.append(&hash(b"two", b"S")).unwrap();
    }

    let mut raw = std::fs::read(&path).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    std::fs::write(&path, &raw).unwrap();

    let ledger = FileLedger::open(&path, &password(), TestEnv::default()).unwrap();
    assert!(matches!(ledger.read_entries(), Err(LedgerError::Decryption { index: 1, .. })));
}

#[test]
fn test_second_writer_is_locked_out() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");

    let holder = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();
    let contender = FileLedger::open(&path, &password(), TestEnv::default());
    assert!(matches!(contender, Err(Error::Ledger(LedgerError::Locked(_)))));

    drop(holder);
    assert!(FileLedger::open(&path, &password(), TestEnv::default()).is_ok());
}

#[test]
fn test_wrong_length_key_is_configuration_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");
    {
        let mut ledger = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();
        ledger.append(&hash(b"test-pass", b"S")).unwrap();
    }

    let raw = std::fs::read(&path).unwrap();
    let err: Error = decrypt(&raw[4..], b"short").unwrap_err().into();

    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_initialize_refuses_populated_ledger() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger");
    let mut ledger = FileLedger::create(&path, &password(), TestEnv::default()).unwrap();

    ledger.initialize(&hash(b"test-pass", b"S")).unwrap();

    assert_eq!(
        ledger.initialize(&hash(b"other", b"S")),
        Err(LedgerError::AlreadyInitialized)
    );
    assert_eq!(ledger.read_entries().unwrap().len(), 1);
}
