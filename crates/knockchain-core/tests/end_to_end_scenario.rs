//! End-to-end derivation scenario.
//!
//! Seed with passphrase `test-pass`, salt `S` and the full port range, derive
//! twice, then replay the same ledger operations from scratch and expect the
//! exact same two triples.

use knockchain_core::{
    DerivationConfig, FileLedger, LedgerPassword, LedgerStore, MemoryLedger, PortSpace, Salt,
    ScriptedPrompter, Sequence, SequenceDeriver, SequenceFile, SystemEnv,
};

fn config() -> DerivationConfig {
    let mut config = DerivationConfig::chained(Salt::new("S").unwrap());
    config.port_space = PortSpace::new(0, 65536, [0, 21, 22, 80, 443]).unwrap();
    config
}

fn run_scenario<L: LedgerStore>(ledger: L) -> (Sequence, Sequence, L) {
    let mut deriver = SequenceDeriver::new(config(), ledger, SystemEnv::new()).unwrap();
    let mut prompter = ScriptedPrompter::new(["test-pass"]);

    let first = deriver.next_sequence(&mut prompter).unwrap();
    let second = deriver.next_sequence(&mut prompter).unwrap();

    // Seed prompted exactly once
    assert_eq!(prompter.asked().len(), 1);
    (first, second, deriver.into_ledger())
}

#[test]
fn successive_derivations_differ_and_replay_exactly() {
    let (first, second, ledger) = run_scenario(MemoryLedger::new());
    assert_ne!(first, second);
    assert_eq!(ledger.entry_count(), 3);

    let (replay_first, replay_second, _) = run_scenario(MemoryLedger::new());
    assert_eq!(first, replay_first);
    assert_eq!(second, replay_second);
}

#[test]
fn file_and_memory_ledgers_derive_identically() {
    let dir = tempfile::tempdir().unwrap();
    let password = LedgerPassword::new("p4ssw0rd").unwrap();
    let file = FileLedger::create(dir.path().join("ledger"), &password, SystemEnv::new()).unwrap();

    let (file_first, file_second, _) = run_scenario(file);
    let (mem_first, mem_second, _) = run_scenario(MemoryLedger::new());

    assert_eq!(file_first, mem_first);
    assert_eq!(file_second, mem_second);
}

#[test]
fn client_and_server_agree_from_shared_ledger_state() {
    // Both ends replay the same history; the server publishes, the client
    // derives locally and must land on the published sequence.
    let dir = tempfile::tempdir().unwrap();
    let published = SequenceFile::new(dir.path().join("open_sequence"));

    let (server_first, _, server_ledger) = run_scenario(MemoryLedger::new());
    published.write(&server_first).unwrap();

    let history = server_ledger.snapshot();
    let client_ledger = MemoryLedger::with_entries(history[..1].to_vec());
    let mut client = SequenceDeriver::new(config(), client_ledger, SystemEnv::new()).unwrap();

    assert_eq!(client.derive().unwrap(), published.read().unwrap());
}
