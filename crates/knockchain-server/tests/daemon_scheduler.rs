//! Daemon scheduling tests on virtual time.
//!
//! `TestEnv::sleep` advances a shared wall clock instead of sleeping, and
//! parks forever once the configured number of sleeps has been used up, so
//! the shutdown future decides exactly how many cycles run.

use std::{
    future::Future,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use knockchain_core::{
    DerivationConfig, Environment, LedgerStore, MemoryLedger, Salt, Sequence, SequenceDeriver,
    SequenceFile,
};
use knockchain_server::{
    DaemonConfig, DaemonError, DaemonScheduler, DaemonState, FirewallReloader, KnockdConfig,
    ReloadError, next_boundary,
};
use proptest::prelude::*;

const START: u64 = 1_700_000_123;

#[derive(Clone)]
struct TestEnv {
    clock: Arc<AtomicU64>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    free_sleeps: usize,
}

impl TestEnv {
    fn new(free_sleeps: usize) -> Self {
        Self {
            clock: Arc::new(AtomicU64::new(START)),
            sleeps: Arc::default(),
            free_sleeps,
        }
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    // Resolves once the scheduler has parked on its last sleep
    fn shutdown(&self) -> impl Future<Output = ()> {
        let env = self.clone();
        async move {
            while env.sleeps.lock().unwrap().len() <= env.free_sleeps {
                tokio::task::yield_now().await;
            }
        }
    }
}

impl Environment for TestEnv {
    fn wall_clock_secs(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let mut sleeps = self.sleeps.lock().unwrap();
        sleeps.push(duration);
        let parked = sleeps.len() > self.free_sleeps;
        if !parked {
            self.clock.fetch_add(duration.as_secs(), Ordering::SeqCst);
        }
        async move {
            if parked {
                std::future::pending::<()>().await;
            }
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x5a);
    }
}

// Captures what was published at the moment the reload ran
#[derive(Clone)]
struct RecordingReloader {
    sequence_file: SequenceFile,
    seen: Arc<Mutex<Vec<Sequence>>>,
    fail: bool,
}

impl RecordingReloader {
    fn new(sequence_file: PathBuf, fail: bool) -> Self {
        Self { sequence_file: SequenceFile::new(sequence_file), seen: Arc::default(), fail }
    }

    fn seen(&self) -> Vec<Sequence> {
        self.seen.lock().unwrap().clone()
    }
}

impl FirewallReloader for RecordingReloader {
    fn reload(&mut self) -> Result<(), ReloadError> {
        self.seen.lock().unwrap().push(self.sequence_file.read().unwrap());
        if self.fail {
            return Err(ReloadError::Failed {
                command: "systemctl start knockd".to_string(),
                status: Some(1),
            });
        }
        Ok(())
    }
}

fn seeded_deriver(env: &TestEnv) -> (SequenceDeriver<MemoryLedger, TestEnv>, MemoryLedger) {
    let ledger = MemoryLedger::new();
    let config = DerivationConfig::chained(Salt::new("S").unwrap());
    let mut deriver = SequenceDeriver::new(config, ledger.clone(), env.clone()).unwrap();
    deriver.initialize("test-pass").unwrap();
    (deriver, ledger)
}

fn daemon_config(dir: &tempfile::TempDir) -> DaemonConfig {
    DaemonConfig { sequence_file: dir.path().join("open_sequence"), ..DaemonConfig::default() }
}

#[tokio::test]
async fn rotates_on_hour_boundaries_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let env = TestEnv::new(2);
    let (deriver, ledger) = seeded_deriver(&env);
    let config = daemon_config(&dir);
    let reloader = RecordingReloader::new(config.sequence_file.clone(), false);

    let mut scheduler =
        DaemonScheduler::new(config, deriver, reloader.clone(), env.clone()).unwrap();
    assert_eq!(scheduler.state(), DaemonState::Idle);

    scheduler.run(env.shutdown()).await.unwrap();

    assert_eq!(scheduler.state(), DaemonState::Stopped);
    assert_eq!(scheduler.cycles(), 3);
    assert_eq!(ledger.entry_count(), 4);

    // First wait realigns to the top of the hour, later ones are whole hours
    let hour = Duration::from_secs(3600);
    assert_eq!(env.sleeps(), vec![Duration::from_secs(2677), hour, hour]);

    let published = reloader.seen();
    assert_eq!(published.len(), 3);
    assert_ne!(published[0], published[1]);
    assert_ne!(published[1], published[2]);
    assert_eq!(SequenceFile::new(dir.path().join("open_sequence")).read().unwrap(), published[2]);
}

#[tokio::test]
async fn publication_precedes_reload() {
    let dir = tempfile::tempdir().unwrap();
    let env = TestEnv::new(0);
    let (deriver, _ledger) = seeded_deriver(&env);
    let knockd_path = dir.path().join("knockd.conf");
    let config = DaemonConfig {
        knockd: Some(KnockdConfig { path: knockd_path.clone(), ..KnockdConfig::default() }),
        ..daemon_config(&dir)
    };
    let reloader = RecordingReloader::new(config.sequence_file.clone(), false);

    let mut scheduler = DaemonScheduler::new(config, deriver, reloader.clone(), env).unwrap();
    let outcome = scheduler.run_cycle().unwrap();

    assert_eq!(outcome.reload, Ok(()));
    assert_eq!(reloader.seen(), vec![outcome.sequence]);
    let knockd = std::fs::read_to_string(knockd_path).unwrap();
    assert!(knockd.contains(&format!("sequence                = {}", outcome.sequence)));
    assert_eq!(scheduler.state(), DaemonState::Idle);
}

#[tokio::test]
async fn reload_failure_keeps_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let env = TestEnv::new(1);
    let (deriver, _ledger) = seeded_deriver(&env);
    let config = daemon_config(&dir);
    let reloader = RecordingReloader::new(config.sequence_file.clone(), true);

    let mut scheduler =
        DaemonScheduler::new(config, deriver, reloader.clone(), env.clone()).unwrap();
    scheduler.run(env.shutdown()).await.unwrap();

    assert_eq!(scheduler.cycles(), 2);
    assert_eq!(reloader.seen().len(), 2);
    assert_eq!(scheduler.state(), DaemonState::Stopped);
}

#[tokio::test]
async fn uninitialized_ledger_stops_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let env = TestEnv::new(0);
    let config = daemon_config(&dir);
    let deriver = SequenceDeriver::new(
        DerivationConfig::chained(Salt::new("S").unwrap()),
        MemoryLedger::new(),
        env.clone(),
    )
    .unwrap();
    let reloader = RecordingReloader::new(config.sequence_file.clone(), false);

    let mut scheduler =
        DaemonScheduler::new(config, deriver, reloader.clone(), env.clone()).unwrap();
    let err = scheduler.run(std::future::pending()).await.unwrap_err();

    assert!(matches!(err, DaemonError::Core(ref core) if core.is_uninitialized_ledger()));
    assert_eq!(scheduler.state(), DaemonState::Stopped);
    assert!(reloader.seen().is_empty());
    assert!(env.sleeps().is_empty());
    assert!(!dir.path().join("open_sequence").exists());
}

#[tokio::test]
async fn client_replaying_the_ledger_derives_published_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let env = TestEnv::new(2);
    let (deriver, server_ledger) = seeded_deriver(&env);
    let seed = server_ledger.snapshot();
    let config = daemon_config(&dir);
    let reloader = RecordingReloader::new(config.sequence_file.clone(), false);

    let mut scheduler =
        DaemonScheduler::new(config, deriver, reloader.clone(), env.clone()).unwrap();
    scheduler.run(env.shutdown()).await.unwrap();

    let client_ledger = MemoryLedger::with_entries(seed);
    let mut client = SequenceDeriver::new(
        DerivationConfig::chained(Salt::new("S").unwrap()),
        client_ledger.clone(),
        env,
    )
    .unwrap();
    let derived: Vec<Sequence> = (0..3).map(|_| client.derive().unwrap()).collect();

    assert_eq!(derived, reloader.seen());
    assert_eq!(client_ledger.read().unwrap(), server_ledger.read().unwrap());
}

proptest! {
    #[test]
    fn boundary_is_next_multiple(now in 0u64..4_000_000_000, interval in 1u64..100_000) {
        let next = next_boundary(now, interval);
        prop_assert!(next > now);
        prop_assert_eq!(next % interval, 0);
        prop_assert!(next - now <= interval);
    }
}
