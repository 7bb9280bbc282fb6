//! Operator interaction.
//!
//! Everything that asks a human for input goes through [`Prompter`], so the
//! deriver and the clients can be driven by [`ScriptedPrompter`] in tests.
//! `Ok(None)` from a prompter means the operator aborted (EOF / Ctrl-D).

use std::{
    collections::VecDeque,
    io::{self, BufRead, Write},
    sync::{Arc, Mutex},
};

use knockchain_crypto::LEDGER_KEY_SIZE;

use crate::{
    config::LedgerPassword,
    error::ConfigError,
    sequence::{SEQUENCE_LEN, Sequence},
};

/// Source of operator input.
pub trait Prompter {
    /// Ask for a secret; input is not echoed.
    fn prompt_secret(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Ask for a visible line of input, without its trailing newline.
    fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Interactive terminal prompter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match rpassword::prompt_password(prompt) {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;
        drop(stdout);

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Prompter that replays canned answers and records what it was asked.
///
/// Secrets and lines share one answer queue. Once the queue is empty every
/// prompt reports an abort. Clones share state, so a test can hand one
/// clone to the code under test and inspect the other.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    answers: Arc<Mutex<VecDeque<String>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    /// Prompter answering with `answers` in order.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let answers = answers.into_iter().map(Into::into).collect();
        Self { answers: Arc::new(Mutex::new(answers)), asked: Arc::default() }
    }

    /// Every prompt shown so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().expect("Mutex poisoned").clone()
    }

    #[allow(clippy::expect_used)]
    fn next(&self, prompt: &str) -> Option<String> {
        self.asked.lock().expect("Mutex poisoned").push(prompt.to_string());
        self.answers.lock().expect("Mutex poisoned").pop_front()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        Ok(self.next(prompt))
    }

    fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        Ok(self.next(prompt))
    }
}

fn ask_secret(prompter: &mut impl Prompter, prompt: &str) -> Result<String, ConfigError> {
    prompter
        .prompt_secret(prompt)
        .map_err(|e| ConfigError::Prompt(e.to_string()))?
        .ok_or_else(|| ConfigError::Aborted { prompt: prompt.trim().to_string() })
}

fn ask_line(prompter: &mut impl Prompter, prompt: &str) -> Result<String, ConfigError> {
    prompter
        .prompt_line(prompt)
        .map_err(|e| ConfigError::Prompt(e.to_string()))?
        .ok_or_else(|| ConfigError::Aborted { prompt: prompt.trim().to_string() })
}

/// Ask for the ledger password until it has the required length.
///
/// # Errors
///
/// - `Aborted`: the operator closed input before a valid password
/// - `Prompt`: the terminal could not be read
pub fn prompt_ledger_password(
    prompter: &mut impl Prompter,
) -> Result<LedgerPassword, ConfigError> {
    loop {
        let entered = ask_secret(prompter, "Ledger password: ")?;
        match LedgerPassword::new(entered) {
            Ok(password) => return Ok(password),
            Err(ConfigError::PasswordLength { actual, .. }) => {
                tracing::warn!(
                    expected = LEDGER_KEY_SIZE,
                    actual,
                    "ledger password has the wrong length, asking again"
                );
            },
            Err(other) => return Err(other),
        }
    }
}

/// Ask for the passphrase that seeds a new ledger. Empty input is refused.
///
/// # Errors
///
/// - `Aborted`: the operator closed input before a passphrase was given
/// - `Prompt`: the terminal could not be read
pub fn prompt_passphrase(prompter: &mut impl Prompter) -> Result<String, ConfigError> {
    loop {
        let entered = ask_secret(prompter, "Ledger is empty. Seed passphrase: ")?;
        if !entered.is_empty() {
            return Ok(entered);
        }
        tracing::warn!("seed passphrase must not be empty, asking again");
    }
}

/// Ask for an open sequence port by port.
///
/// Used when no sequence could be obtained automatically.
///
/// # Errors
///
/// - `Aborted`: the operator closed input
/// - `Prompt`: the terminal could not be read
pub fn prompt_ports(prompter: &mut impl Prompter) -> Result<Sequence, ConfigError> {
    const ORDINALS: [&str; SEQUENCE_LEN] = ["first", "second", "third"];

    let mut ports = [0u16; SEQUENCE_LEN];
    for (slot, ordinal) in ports.iter_mut().zip(ORDINALS) {
        let prompt = format!("Please enter {ordinal} port: ");
        *slot = loop {
            let entered = ask_line(prompter, &prompt)?;
            match entered.trim().parse::<u16>() {
                Ok(port) => break port,
                Err(_) => tracing::warn!(input = %entered.trim(), "not a port number"),
            }
        };
    }
    Ok(Sequence::new(ports))
}
