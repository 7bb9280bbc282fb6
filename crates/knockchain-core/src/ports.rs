//! Port space: bounds, exclusions and the tie-break rule.
//!
//! # Invariants
//!
//! - Every port returned lies in `[min_port, max_port)` and is not excluded
//! - Collisions with the exclusion set are resolved by incrementing; reaching
//!   `max_port` wraps to `min_port`
//! - A full cycle without a usable port is an error, never a silent
//!   out-of-range value

use std::{collections::BTreeSet, num::NonZeroU64};

use knockchain_crypto::HexDigest;
use rand::Rng;

use crate::error::{ConfigError, DerivationError};

/// Upper bound for `max_port` (exclusive): the whole TCP port range.
pub const MAX_PORT_LIMIT: u32 = 65536;

/// Ports excluded unless configured otherwise: reserved zero plus FTP, SSH,
/// HTTP and HTTPS.
pub const DEFAULT_EXCLUDED_PORTS: [u16; 5] = [0, 21, 22, 80, 443];

/// Range of usable knock ports minus an exclusion set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpace {
    min_port: u32,
    max_port: u32,
    excluded: BTreeSet<u16>,
}

impl PortSpace {
    /// Build and validate a port space.
    ///
    /// # Errors
    ///
    /// - `InvalidPortBounds`: `min_port >= max_port` or `max_port > 65536`
    pub fn new(
        min_port: u32,
        max_port: u32,
        excluded: impl IntoIterator<Item = u16>,
    ) -> Result<Self, ConfigError> {
        let space = Self { min_port, max_port, excluded: excluded.into_iter().collect() };
        space.validate()?;
        Ok(space)
    }

    /// Check the bounds.
    ///
    /// An exclusion set covering the whole range passes validation and is
    /// reported by [`resolve`](Self::resolve) as a derivation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_port >= self.max_port || self.max_port > MAX_PORT_LIMIT {
            return Err(ConfigError::InvalidPortBounds {
                min_port: self.min_port,
                max_port: self.max_port,
            });
        }
        Ok(())
    }

    /// Lower bound (inclusive).
    pub fn min_port(&self) -> u32 {
        self.min_port
    }

    /// Upper bound (exclusive).
    pub fn max_port(&self) -> u32 {
        self.max_port
    }

    /// Excluded ports.
    pub fn excluded(&self) -> &BTreeSet<u16> {
        &self.excluded
    }

    /// Number of values in `[min_port, max_port)`.
    pub fn len(&self) -> u32 {
        self.max_port.saturating_sub(self.min_port)
    }

    /// True when the bounds leave no values at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `port` is in range and not excluded.
    pub fn contains(&self, port: u16) -> bool {
        let value = u32::from(port);
        value >= self.min_port && value < self.max_port && !self.excluded.contains(&port)
    }

    /// Map a digest onto a usable port.
    ///
    /// Candidate is `min_port + (digest mod len)`, then the tie-break rule.
    pub fn port_for(&self, digest: &HexDigest) -> Result<u16, DerivationError> {
        let Some(len) = NonZeroU64::new(u64::from(self.len())) else {
            return Err(self.exhausted());
        };
        let offset = digest.reduce(len) as u32;
        self.resolve(self.min_port + offset)
    }

    /// Draw a uniformly random candidate and apply the tie-break rule.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<u16, DerivationError> {
        if self.is_empty() {
            return Err(self.exhausted());
        }
        let candidate = rng.gen_range(self.min_port..self.max_port);
        self.resolve(candidate)
    }

    /// Tie-break: increment past excluded values, wrapping at `max_port`.
    ///
    /// # Errors
    ///
    /// - `PortSpaceExhausted`: every value in the range is excluded
    pub fn resolve(&self, candidate: u32) -> Result<u16, DerivationError> {
        let mut port = if (self.min_port..self.max_port).contains(&candidate) {
            candidate
        } else {
            self.min_port
        };

        for _ in 0..self.len() {
            let value = port as u16;
            if !self.excluded.contains(&value) {
                return Ok(value);
            }
            port += 1;
            if port >= self.max_port {
                port = self.min_port;
            }
        }

        Err(self.exhausted())
    }

    fn exhausted(&self) -> DerivationError {
        DerivationError::PortSpaceExhausted { min_port: self.min_port, max_port: self.max_port }
    }
}

impl Default for PortSpace {
    fn default() -> Self {
        Self {
            min_port: 0,
            max_port: MAX_PORT_LIMIT,
            excluded: DEFAULT_EXCLUDED_PORTS.into_iter().collect(),
        }
    }
}
