//! Knock transmission.
//!
//! A knock is a TCP connection *attempt*: one SYN to the target port, then
//! the socket is dropped whatever happened. Refused and timed-out attempts
//! are the normal case against a firewalled host, so outcomes are logged
//! and never turned into errors.
//!
//! # Ordering
//!
//! Within [`KnockTransmitter::run_cycle`] the open burst strictly precedes
//! the delay (or manual trigger), which strictly precedes the close burst.
//! Lost packets are not retried; the operator reruns the whole cycle.

use std::{
    io,
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    time::Duration,
};

use knockchain_core::{Environment, Prompter, Sequence};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::KnockError;

/// Default per-attempt connect timeout. Must stay well under a second for
/// the firewall's sequence window.
pub const DEFAULT_KNOCK_TIMEOUT: Duration = Duration::from_millis(300);

/// Default pause between two knocks of one burst.
pub const DEFAULT_KNOCK_GAP: Duration = Duration::from_millis(100);

/// Default wait between the open and close bursts.
pub const DEFAULT_CLOSE_DELAY: Duration = Duration::from_secs(5);

/// Default close sequence.
pub const DEFAULT_CLOSE_SEQUENCE: [u16; 3] = [10000, 20000, 30000];

/// What happened to a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnockOutcome {
    /// The port accepted the connection
    Connected,
    /// RST received
    Refused,
    /// No answer within the timeout (filtered port)
    TimedOut,
    /// Local failure before or during the attempt
    Failed(io::ErrorKind),
}

/// One connection attempt to one address.
pub trait Knocker {
    /// Attempt a connection to `addr` and abandon it immediately.
    fn knock(&mut self, addr: SocketAddr) -> KnockOutcome;
}

/// TCP knocker: non-blocking connect with a timeout, then an abortive close.
#[derive(Debug, Clone, Copy)]
pub struct TcpKnocker {
    timeout: Duration,
}

impl TcpKnocker {
    /// Knocker giving up on each attempt after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpKnocker {
    fn default() -> Self {
        Self::new(DEFAULT_KNOCK_TIMEOUT)
    }
}

impl Knocker for TcpKnocker {
    fn knock(&mut self, addr: SocketAddr) -> KnockOutcome {
        let domain = Domain::for_address(addr);
        let socket = match Socket::new(domain, Type::STREAM, Some(Protocol::TCP)) {
            Ok(socket) => socket,
            Err(e) => return KnockOutcome::Failed(e.kind()),
        };

        // Reset instead of FIN on drop; no session is wanted.
        if let Err(e) = socket.set_linger(Some(Duration::ZERO)) {
            tracing::trace!(error = %e, "cannot set linger");
        }

        match socket.connect_timeout(&SockAddr::from(addr), self.timeout) {
            Ok(()) => KnockOutcome::Connected,
            Err(e) => match e.kind() {
                io::ErrorKind::ConnectionRefused => KnockOutcome::Refused,
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => KnockOutcome::TimedOut,
                kind => KnockOutcome::Failed(kind),
            },
        }
    }
}

/// When the close burst is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// After a fixed delay
    Auto(Duration),
    /// After the operator confirms
    Manual,
}

impl Default for CloseMode {
    fn default() -> Self {
        Self::Auto(DEFAULT_CLOSE_DELAY)
    }
}

/// Knock transmission settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnockConfig {
    /// Target host: IPv4, IPv6 or DNS name
    pub host: String,
    /// Per-attempt connect timeout
    pub timeout: Duration,
    /// Pause between knocks of one burst
    pub gap: Duration,
    /// Sequence sent after the open sequence
    pub close_sequence: Sequence,
    /// Close trigger
    pub close_mode: CloseMode,
}

impl Default for KnockConfig {
    fn default() -> Self {
        Self {
            host: "server.local".to_string(),
            timeout: DEFAULT_KNOCK_TIMEOUT,
            gap: DEFAULT_KNOCK_GAP,
            close_sequence: Sequence::new(DEFAULT_CLOSE_SEQUENCE),
            close_mode: CloseMode::default(),
        }
    }
}

impl KnockConfig {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), KnockError> {
        if self.host.trim().is_empty() {
            return Err(KnockError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(KnockError::InvalidConfig("knock timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Outcomes of a full open/close cycle, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Open burst outcomes
    pub open: Vec<KnockOutcome>,
    /// Close burst outcomes
    pub close: Vec<KnockOutcome>,
}

/// Sends knock bursts to one host.
pub struct KnockTransmitter<K, E> {
    config: KnockConfig,
    knocker: K,
    env: E,
}

impl<K: Knocker, E: Environment> KnockTransmitter<K, E> {
    /// Create a transmitter after validating `config`.
    pub fn new(config: KnockConfig, knocker: K, env: E) -> Result<Self, KnockError> {
        config.validate()?;
        Ok(Self { config, knocker, env })
    }

    /// Active configuration.
    pub fn config(&self) -> &KnockConfig {
        &self.config
    }

    /// Underlying knocker.
    pub fn knocker(&self) -> &K {
        &self.knocker
    }

    fn resolve(&self) -> Result<IpAddr, KnockError> {
        let host = self.config.host.as_str();
        let resolve_error =
            |reason: String| KnockError::Resolve { host: host.to_string(), reason };

        (host, 0)
            .to_socket_addrs()
            .map_err(|e| resolve_error(e.to_string()))?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| resolve_error("no addresses".to_string()))
    }

    /// Knock every port of `sequence`, in order.
    ///
    /// The host is resolved once up front so a DNS failure sends nothing.
    pub async fn transmit(
        &mut self,
        sequence: &Sequence,
    ) -> Result<Vec<KnockOutcome>, KnockError> {
        let ip = self.resolve()?;
        let mut outcomes = Vec::with_capacity(sequence.ports().len());

        for (i, port) in sequence.iter().enumerate() {
            if i > 0 {
                self.env.sleep(self.config.gap).await;
            }
            let outcome = self.knocker.knock(SocketAddr::new(ip, port));
            tracing::debug!(%ip, port, ?outcome, "knock");
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// Open burst, delay or manual trigger, close burst.
    ///
    /// # Errors
    ///
    /// - `Resolve`: the host did not resolve; nothing was sent
    /// - `Aborted`: the manual trigger was aborted after the open burst;
    ///   the close burst was not sent
    pub async fn run_cycle(
        &mut self,
        open: &Sequence,
        prompter: &mut impl Prompter,
    ) -> Result<CycleReport, KnockError> {
        tracing::info!(host = %self.config.host, sequence = %open, "sending open sequence");
        let open_outcomes = self.transmit(open).await?;

        match self.config.close_mode {
            CloseMode::Auto(delay) => {
                tracing::info!(delay_secs = delay.as_secs_f64(), "waiting before closing");
                self.env.sleep(delay).await;
            },
            CloseMode::Manual => {
                let trigger = prompter
                    .prompt_line("Press enter to run the closing process...")
                    .map_err(|e| KnockError::Prompt(e.to_string()))?;
                if trigger.is_none() {
                    tracing::warn!("close trigger aborted, close sequence not sent");
                    return Err(KnockError::Aborted);
                }
            },
        }

        let close = self.config.close_sequence;
        tracing::info!(sequence = %close, "sending close sequence");
        let close_outcomes = self.transmit(&close).await?;

        Ok(CycleReport { open: open_outcomes, close: close_outcomes })
    }
}
