//! Sequence derivation.
//!
//! # Chained derivation
//!
//! ```text
//! content = concat(ledger entries)
//! h0 = H(salt || content)        appended to the ledger ("advance")
//! h1 = H(salt || h0)  ->  port 1
//! h2 = H(salt || h1)  ->  port 2
//! h3 = H(salt || h2)  ->  port 3
//! ```
//!
//! Every derivation appends `h0`, so the next derivation hashes a longer
//! ledger and an old sequence cannot be replayed once a new one exists.
//!
//! # Invariants
//!
//! - Same ledger content and salt always produce the same [`ChainStep`]
//! - Nothing is appended unless all three ports were derived
//! - `Random` and `Static` sources never read or write the ledger

use knockchain_crypto::{HexDigest, hash};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    config::{DerivationConfig, Salt, SequenceSource},
    env::Environment,
    error::{ConfigError, DerivationError, Error, LedgerError},
    ledger::LedgerStore,
    ports::PortSpace,
    prompt::{Prompter, prompt_passphrase},
    sequence::{SEQUENCE_LEN, Sequence},
};

/// One step of the chain, computed from a ledger snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    /// Digest of the ledger content; the entry this step appends
    pub advance: HexDigest,
    /// `h1..h3`, each the digest of the previous
    pub chain: [HexDigest; SEQUENCE_LEN],
    /// Ports mapped from `chain`
    pub sequence: Sequence,
}

/// Compute the chain step for `content` without touching any storage.
///
/// # Errors
///
/// - `PortSpaceExhausted`: the port space has no usable port
pub fn derive_from_content(
    content: &[u8],
    salt: &Salt,
    port_space: &PortSpace,
) -> Result<ChainStep, DerivationError> {
    let advance = hash(content, salt.as_bytes());
    let h1 = hash(advance.as_bytes(), salt.as_bytes());
    let h2 = hash(h1.as_bytes(), salt.as_bytes());
    let h3 = hash(h2.as_bytes(), salt.as_bytes());

    let sequence = Sequence::new([
        port_space.port_for(&h1)?,
        port_space.port_for(&h2)?,
        port_space.port_for(&h3)?,
    ]);

    Ok(ChainStep { advance, chain: [h1, h2, h3], sequence })
}

/// Produces open sequences from the configured source.
///
/// Owns its ledger: the deriver is the single writer for as long as it lives.
pub struct SequenceDeriver<L, E> {
    config: DerivationConfig,
    ledger: L,
    env: E,
}

impl<L: LedgerStore, E: Environment> SequenceDeriver<L, E> {
    /// Create a deriver after validating `config`.
    ///
    /// # Errors
    ///
    /// - any [`ConfigError`] from [`DerivationConfig::validate`]
    pub fn new(config: DerivationConfig, ledger: L, env: E) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, ledger, env })
    }

    /// Active configuration.
    pub fn config(&self) -> &DerivationConfig {
        &self.config
    }

    /// Underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Give the ledger back, releasing single-writer ownership.
    pub fn into_ledger(self) -> L {
        self.ledger
    }

    /// Seed an empty ledger with `H(salt || passphrase)`.
    ///
    /// # Errors
    ///
    /// - `Config(EmptyPassphrase)`: passphrase is empty
    /// - `Ledger(AlreadyInitialized)`: the ledger has entries
    pub fn initialize(&mut self, passphrase: &str) -> Result<(), Error> {
        if passphrase.is_empty() {
            return Err(ConfigError::EmptyPassphrase.into());
        }
        let seed = hash(passphrase.as_bytes(), self.config.salt.as_bytes());
        self.ledger.initialize(&seed)?;
        Ok(())
    }

    /// Chain step the next derivation would take, without appending.
    ///
    /// # Errors
    ///
    /// - `Ledger(Uninitialized)`: the ledger is empty
    pub fn peek(&self) -> Result<ChainStep, Error> {
        if self.ledger.is_empty()? {
            return Err(LedgerError::Uninitialized.into());
        }
        let content = self.ledger.read()?;
        Ok(derive_from_content(&content, &self.config.salt, &self.config.port_space)?)
    }

    /// Next open sequence, without any operator interaction.
    ///
    /// In `Chained` mode an empty ledger is an error here; use
    /// [`next_sequence`](Self::next_sequence) to seed it interactively.
    ///
    /// # Errors
    ///
    /// - `Ledger(Uninitialized)`: chained mode on an empty ledger
    /// - `Ledger(_)`: the ledger could not be read or extended
    /// - `Derivation(_)`: no usable port
    pub fn derive(&mut self) -> Result<Sequence, Error> {
        match &self.config.source {
            SequenceSource::Static(sequence) => {
                tracing::debug!("using static open sequence");
                Ok(*sequence)
            },
            SequenceSource::Random => self.random_sequence(),
            SequenceSource::Chained => self.advance_chain(),
        }
    }

    /// Next open sequence, seeding an empty ledger from a prompted
    /// passphrase first.
    ///
    /// # Errors
    ///
    /// As [`derive`](Self::derive), plus `Config(Aborted)` when the
    /// operator aborts the passphrase prompt.
    pub fn next_sequence(&mut self, prompter: &mut impl Prompter) -> Result<Sequence, Error> {
        if self.config.source == SequenceSource::Chained && self.ledger.is_empty()? {
            tracing::info!("ledger is empty, seeding from passphrase");
            let passphrase = prompt_passphrase(prompter)?;
            self.initialize(&passphrase)?;
        }
        self.derive()
    }

    fn advance_chain(&mut self) -> Result<Sequence, Error> {
        let step = self.peek()?;
        self.ledger.append(&step.advance)?;
        tracing::info!(advance = ?step.advance, "chain advanced");
        Ok(step.sequence)
    }

    fn random_sequence(&self) -> Result<Sequence, Error> {
        let mut rng = StdRng::from_seed(self.env.random_seed());
        let space = &self.config.port_space;
        let sequence = Sequence::new([
            space.sample(&mut rng)?,
            space.sample(&mut rng)?,
            space.sample(&mut rng)?,
        ]);
        tracing::debug!("random open sequence drawn");
        Ok(sequence)
    }
}
