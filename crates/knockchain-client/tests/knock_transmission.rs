//! Knock transmission tests.
//!
//! Ordering and timing are checked against a recording knocker on virtual
//! time; `TcpKnocker` is checked against real loopback sockets.

use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex},
    time::Duration,
};

use knockchain_client::{
    CloseMode, KnockConfig, KnockError, KnockOutcome, KnockTransmitter, Knocker, TcpKnocker,
};
use knockchain_core::{Environment, ScriptedPrompter, Sequence};
use proptest::prelude::*;

// Records requested sleeps instead of sleeping
#[derive(Clone, Default)]
struct TestEnv {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl TestEnv {
    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Environment for TestEnv {
    fn wall_clock_secs(&self) -> u64 {
        0
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.sleeps.lock().unwrap().push(duration);
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x42);
    }
}

#[derive(Clone, Default)]
struct RecordingKnocker {
    knocked: Arc<Mutex<Vec<SocketAddr>>>,
}

impl RecordingKnocker {
    fn ports(&self) -> Vec<u16> {
        self.knocked.lock().unwrap().iter().map(SocketAddr::port).collect()
    }
}

impl Knocker for RecordingKnocker {
    fn knock(&mut self, addr: SocketAddr) -> KnockOutcome {
        self.knocked.lock().unwrap().push(addr);
        KnockOutcome::Refused
    }
}

fn config(close_mode: CloseMode) -> KnockConfig {
    KnockConfig { host: "127.0.0.1".to_string(), close_mode, ..KnockConfig::default() }
}

#[tokio::test]
async fn auto_cycle_sends_open_then_close_after_delay() {
    let env = TestEnv::default();
    let knocker = RecordingKnocker::default();
    let mut transmitter = KnockTransmitter::new(
        config(CloseMode::Auto(Duration::from_secs(5))),
        knocker.clone(),
        env.clone(),
    )
    .unwrap();
    let mut prompter = ScriptedPrompter::default();

    let report =
        transmitter.run_cycle(&Sequence::new([41223, 9981, 63004]), &mut prompter).await.unwrap();

    assert_eq!(knocker.ports(), vec![41223, 9981, 63004, 10000, 20000, 30000]);
    assert_eq!(report.open, vec![KnockOutcome::Refused; 3]);
    assert_eq!(report.close, vec![KnockOutcome::Refused; 3]);

    let gap = Duration::from_millis(100);
    assert_eq!(env.sleeps(), vec![gap, gap, Duration::from_secs(5), gap, gap]);
    assert!(prompter.asked().is_empty());
}

#[tokio::test]
async fn manual_cycle_waits_for_trigger() {
    let env = TestEnv::default();
    let knocker = RecordingKnocker::default();
    let mut transmitter =
        KnockTransmitter::new(config(CloseMode::Manual), knocker.clone(), env.clone()).unwrap();
    let mut prompter = ScriptedPrompter::new([""]);

    transmitter.run_cycle(&Sequence::new([1, 2, 3]), &mut prompter).await.unwrap();

    assert_eq!(knocker.ports(), vec![1, 2, 3, 10000, 20000, 30000]);
    assert_eq!(prompter.asked().len(), 1);
    assert!(!env.sleeps().contains(&Duration::from_secs(5)));
}

#[tokio::test]
async fn aborted_trigger_skips_close_burst() {
    let knocker = RecordingKnocker::default();
    let mut transmitter =
        KnockTransmitter::new(config(CloseMode::Manual), knocker.clone(), TestEnv::default())
            .unwrap();
    let mut prompter = ScriptedPrompter::default();

    let result = transmitter.run_cycle(&Sequence::new([1, 2, 3]), &mut prompter).await;

    assert_eq!(result, Err(KnockError::Aborted));
    assert_eq!(knocker.ports(), vec![1, 2, 3]);
}

#[tokio::test]
async fn unresolvable_host_sends_nothing() {
    let knocker = RecordingKnocker::default();
    let config = KnockConfig { host: "knockchain.invalid".to_string(), ..KnockConfig::default() };
    let mut transmitter =
        KnockTransmitter::new(config, knocker.clone(), TestEnv::default()).unwrap();

    let result = transmitter.transmit(&Sequence::new([1, 2, 3])).await;

    assert!(matches!(result, Err(KnockError::Resolve { .. })));
    assert!(knocker.ports().is_empty());
}

#[test]
fn tcp_knock_on_listening_port_connects() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let outcome = TcpKnocker::new(Duration::from_millis(300)).knock(addr);

    assert_eq!(outcome, KnockOutcome::Connected);
}

#[test]
fn tcp_knock_on_closed_port_is_refused_not_an_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let outcome = TcpKnocker::new(Duration::from_millis(300)).knock(addr);

    assert_eq!(outcome, KnockOutcome::Refused);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_open_burst_precedes_close_burst(
        open in prop::array::uniform3(any::<u16>()),
        close in prop::array::uniform3(any::<u16>()),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let knocker = RecordingKnocker::default();
        let config = KnockConfig {
            host: "127.0.0.1".to_string(),
            close_sequence: Sequence::new(close),
            ..KnockConfig::default()
        };
        let mut transmitter =
            KnockTransmitter::new(config, knocker.clone(), TestEnv::default()).unwrap();
        let mut prompter = ScriptedPrompter::default();

        runtime
            .block_on(transmitter.run_cycle(&Sequence::new(open), &mut prompter))
            .unwrap();

        let expected: Vec<u16> = open.iter().chain(close.iter()).copied().collect();
        prop_assert_eq!(knocker.ports(), expected);
    }
}
