//! Scheduled sequence rotation.
//!
//! The daemon derives a fresh open sequence once per interval, aligned to
//! wall-clock boundaries (the top of every hour by default), publishes it
//! and restarts the firewall log parser.
//!
//! # State Machine
//!
//! ```text
//! Idle -> Deriving -> Publishing -> Sleeping -> Idle -> ...
//!                                      |
//!                         shutdown ----+----> Stopped
//! ```
//!
//! # Ordering
//!
//! Within a cycle, derivation precedes publication of the sequence file,
//! which precedes the knockd configuration write, which precedes the
//! service restart.
//!
//! # Failure Policy
//!
//! Ledger, configuration and derivation failures stop the daemon. A failed
//! firewall reload is logged and the schedule continues: the sequence is
//! already published and the next cycle retries the reload.

use std::{future::Future, path::PathBuf, pin::pin, time::Duration};

use knockchain_core::{Environment, LedgerStore, Sequence, SequenceDeriver, SequenceFile};

use crate::{
    error::{DaemonError, ReloadError},
    firewall::{FirewallReloader, KnockdConfig},
};

/// Default rotation interval: one hour.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Rotation interval; cycles start on multiples of it since the epoch
    pub interval: Duration,
    /// Published sequence file
    pub sequence_file: PathBuf,
    /// knockd configuration to render on every publication, if any
    pub knockd: Option<KnockdConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            sequence_file: PathBuf::from("open_sequence"),
            knockd: None,
        }
    }
}

impl DaemonConfig {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.interval.as_secs() == 0 {
            return Err(DaemonError::InvalidConfig(
                "interval must be at least one second".to_string(),
            ));
        }
        if let Some(knockd) = &self.knockd {
            knockd.validate().map_err(DaemonError::InvalidConfig)?;
        }
        Ok(())
    }
}

/// Where the scheduler currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Between cycles
    Idle,
    /// Deriving the next sequence
    Deriving,
    /// Writing the sequence and restarting the firewall
    Publishing,
    /// Waiting for the next boundary
    Sleeping,
    /// Terminal
    Stopped,
}

/// Result of one rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Published sequence
    pub sequence: Sequence,
    /// Firewall reload failure, if any
    pub reload: Result<(), ReloadError>,
}

/// Periodic derive/publish/reload loop.
pub struct DaemonScheduler<L, E, R> {
    config: DaemonConfig,
    deriver: SequenceDeriver<L, E>,
    publisher: SequenceFile,
    reloader: R,
    env: E,
    state: DaemonState,
    cycles: u64,
}

impl<L, E, R> DaemonScheduler<L, E, R>
where
    L: LedgerStore,
    E: Environment,
    R: FirewallReloader,
{
    /// Create a scheduler after validating `config`.
    pub fn new(
        config: DaemonConfig,
        deriver: SequenceDeriver<L, E>,
        reloader: R,
        env: E,
    ) -> Result<Self, DaemonError> {
        config.validate()?;
        let publisher = SequenceFile::new(&config.sequence_file);
        Ok(Self { config, deriver, publisher, reloader, env, state: DaemonState::Idle, cycles: 0 })
    }

    /// Current state.
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Completed rotations.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Active configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Underlying deriver.
    pub fn deriver(&self) -> &SequenceDeriver<L, E> {
        &self.deriver
    }

    /// Firewall reloader.
    pub fn reloader(&self) -> &R {
        &self.reloader
    }

    /// First interval boundary strictly after `now` (epoch seconds).
    pub fn next_boundary(&self, now: u64) -> u64 {
        next_boundary(now, self.config.interval.as_secs())
    }

    /// Derive, publish and reload once.
    ///
    /// # Errors
    ///
    /// Derivation and sequence file failures; the scheduler is left in
    /// [`DaemonState::Stopped`]. A reload failure is not an error here, it
    /// is reported in the returned [`CycleOutcome`].
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, DaemonError> {
        let result = self.rotate();
        self.state = if result.is_ok() { DaemonState::Idle } else { DaemonState::Stopped };
        result
    }

    fn rotate(&mut self) -> Result<CycleOutcome, DaemonError> {
        self.state = DaemonState::Deriving;
        let sequence = self.deriver.derive()?;
        tracing::debug!(%sequence, "sequence derived");

        self.state = DaemonState::Publishing;
        self.publisher.write(&sequence)?;

        let reload = self.reload(&sequence);
        if let Err(e) = &reload {
            tracing::warn!(error = %e, "firewall reload failed, keeping schedule");
        }

        self.cycles += 1;
        tracing::info!(cycle = self.cycles, "sequence rotated");
        Ok(CycleOutcome { sequence, reload })
    }

    fn reload(&mut self, sequence: &Sequence) -> Result<(), ReloadError> {
        if let Some(knockd) = &self.config.knockd {
            knockd.write(sequence)?;
        }
        self.reloader.reload()
    }

    /// Rotate now, then at every boundary, until `shutdown` resolves.
    ///
    /// `shutdown` is only observed while sleeping; a cycle in progress
    /// always completes.
    ///
    /// # Errors
    ///
    /// The first fatal [`Self::run_cycle`] failure.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<(), DaemonError> {
        let mut shutdown = pin!(shutdown);
        let env = self.env.clone();
        tracing::info!(interval_secs = self.config.interval.as_secs(), "daemon started");

        loop {
            self.run_cycle()?;

            let now = env.wall_clock_secs();
            let next = self.next_boundary(now);
            self.state = DaemonState::Sleeping;
            tracing::debug!(now, next, "sleeping until next boundary");

            let stopped = tokio::select! {
                () = &mut shutdown => true,
                () = env.sleep(Duration::from_secs(next - now)) => false,
            };

            if stopped {
                self.state = DaemonState::Stopped;
                tracing::info!(cycles = self.cycles, "daemon stopped");
                return Ok(());
            }
            self.state = DaemonState::Idle;
        }
    }
}

/// First multiple of `interval` strictly greater than `now`.
///
/// `interval` must be non-zero.
pub fn next_boundary(now: u64, interval: u64) -> u64 {
    (now / interval).saturating_add(1).saturating_mul(interval)
}
