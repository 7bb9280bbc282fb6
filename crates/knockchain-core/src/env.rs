//! Environment abstraction for deterministic testing.
//!
//! Decouples ledger nonces, random sequences and daemon scheduling from
//! system resources (wall clock, randomness, sleeping). Tests drive virtual
//! time and seeded randomness; production uses [`crate::SystemEnv`].

use std::time::Duration;

/// Abstract environment providing wall-clock time, randomness and sleeping.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
///   (ledger nonces must never repeat under one password)
/// - `wall_clock_secs()` reports seconds since the Unix epoch
pub trait Environment: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch.
    ///
    /// Used to align daemon cycles to wall-clock boundaries. May jump (NTP
    /// adjustments); callers recompute the remaining time every cycle.
    fn wall_clock_secs(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by scheduling code (not derivation logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random 32-byte seed for a local RNG.
    fn random_seed(&self) -> [u8; 32] {
        let mut seed = [0u8; 32];
        self.random_bytes(&mut seed);
        seed
    }
}
