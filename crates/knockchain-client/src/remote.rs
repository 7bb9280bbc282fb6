//! Remote sequence fetch for lightweight clients.
//!
//! A lightweight client never holds the ledger. It logs into the server over
//! SSH, reads the sequence file the server already published, and stores a
//! local copy. Only read-only commands are sent.
//!
//! ```text
//! connect + authenticate   (bounded retry, password re-prompted)
//! detect OS                `uname -s`, else `cmd /C ver`
//! read file                `cat -- '<path>'` | `type "<path>"`
//! parse + store locally
//! ```

use std::{
    borrow::Cow,
    fmt,
    io::Read,
    net::{TcpStream, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

use knockchain_core::{ConfigError, Prompter, Sequence, SequenceFile, prompt::prompt_ports};
use ssh2::{CheckResult, KnownHostFileKind, Session};

use crate::error::RemoteFetchError;

/// Default number of authentication attempts.
pub const DEFAULT_MAX_AUTH_ATTEMPTS: u32 = 3;

/// How to authenticate to the remote host.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Account password
    Password(String),
    /// Private key file
    KeyFile {
        /// Private key path
        private_key: PathBuf,
        /// Public key path, if not derivable from the private key
        public_key: Option<PathBuf>,
        /// Key passphrase
        passphrase: Option<String>,
    },
    /// Keys held by a running SSH agent
    Agent,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::KeyFile { private_key, .. } => {
                f.debug_struct("KeyFile").field("private_key", private_key).finish_non_exhaustive()
            },
            Self::Agent => f.write_str("Agent"),
        }
    }
}

/// Remote fetch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Server host
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Account name
    pub username: String,
    /// Sequence file path on the server
    pub remote_path: String,
    /// Authentication attempts before giving up
    pub max_auth_attempts: u32,
    /// TCP connect and session I/O timeout
    pub timeout: Duration,
    /// `known_hosts` file to verify the host key against
    pub known_hosts: Option<PathBuf>,
    /// Refuse hosts missing from `known_hosts`
    pub strict_host_keys: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "server.local".to_string(),
            port: 22,
            username: String::new(),
            remote_path: "open_sequence".to_string(),
            max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
            timeout: Duration::from_secs(10),
            known_hosts: None,
            strict_host_keys: false,
        }
    }
}

impl RemoteConfig {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };
        if self.host.trim().is_empty() {
            return Err(invalid("remote host", "must not be empty"));
        }
        if self.username.is_empty() {
            return Err(invalid("remote user", "must not be empty"));
        }
        if self.remote_path.is_empty() {
            return Err(invalid("remote path", "must not be empty"));
        }
        if self.max_auth_attempts == 0 {
            return Err(invalid("max auth attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// Output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit status
    pub status: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

/// An authenticated remote command channel.
pub trait RemoteSession {
    /// Run `command` and collect its output.
    fn exec(&mut self, command: &str) -> Result<CommandOutput, RemoteFetchError>;
}

/// Opens authenticated sessions.
pub trait RemoteConnector {
    /// Session type produced.
    type Session: RemoteSession;

    /// Connect and authenticate once.
    ///
    /// Rejected credentials must be reported as
    /// [`RemoteFetchError::Authentication`] so the caller can retry.
    fn connect(
        &mut self,
        config: &RemoteConfig,
        credentials: &Credentials,
    ) -> Result<Self::Session, RemoteFetchError>;
}

/// Operating systems we know how to read a file on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOs {
    /// Linux
    Linux,
    /// macOS
    MacOs,
    /// FreeBSD, OpenBSD, NetBSD, DragonFly
    Bsd,
    /// Windows (`cmd.exe`)
    Windows,
}

impl RemoteOs {
    /// Classify `uname -s` output.
    pub fn from_uname(uname: &str) -> Option<Self> {
        match uname.trim() {
            "Linux" => Some(Self::Linux),
            "Darwin" => Some(Self::MacOs),
            name if name.ends_with("BSD") || name == "DragonFly" => Some(Self::Bsd),
            _ => None,
        }
    }

    /// Probe the remote host.
    pub fn detect(session: &mut impl RemoteSession) -> Result<Self, RemoteFetchError> {
        let uname = session.exec("uname -s")?;
        if uname.status == 0 {
            if let Some(os) = Self::from_uname(&uname.stdout) {
                return Ok(os);
            }
            return Err(RemoteFetchError::UnsupportedOs(uname.stdout.trim().to_string()));
        }

        let ver = session.exec("cmd /C ver")?;
        if ver.status == 0 && ver.stdout.contains("Windows") {
            return Ok(Self::Windows);
        }
        Err(RemoteFetchError::UnsupportedOs(ver.stdout.trim().to_string()))
    }

    /// Read-only command printing the file at `path`.
    pub fn read_command(self, path: &str) -> Result<String, RemoteFetchError> {
        match self {
            Self::Linux | Self::MacOs | Self::Bsd => {
                Ok(format!("cat -- {}", shell_escape::unix::escape(Cow::Borrowed(path))))
            },
            Self::Windows => {
                if path.contains('"') {
                    return Err(RemoteFetchError::InvalidPath(path.to_string()));
                }
                Ok(format!("type \"{path}\""))
            },
        }
    }
}

/// Fetches the published open sequence from the server.
pub struct RemoteSequenceFetcher<C> {
    config: RemoteConfig,
    connector: C,
    local: SequenceFile,
}

impl<C: RemoteConnector> RemoteSequenceFetcher<C> {
    /// Create a fetcher storing fetched sequences in `local`.
    pub fn new(
        config: RemoteConfig,
        connector: C,
        local: SequenceFile,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, connector, local })
    }

    /// Active configuration.
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Connect, read the remote sequence file, store it locally.
    ///
    /// # Errors
    ///
    /// - `Authentication`: credentials rejected `max_auth_attempts` times,
    ///   or the operator aborted the password re-prompt
    /// - `Connection`, `UnsupportedOs`, `Command`, `Parse`, `LocalWrite`
    pub fn fetch(
        &mut self,
        credentials: Credentials,
        prompter: &mut impl Prompter,
    ) -> Result<Sequence, RemoteFetchError> {
        let mut session = self.authenticate(credentials, prompter)?;

        let os = RemoteOs::detect(&mut session)?;
        tracing::debug!(?os, "remote OS detected");

        let command = os.read_command(&self.config.remote_path)?;
        let output = session.exec(&command)?;
        if output.status != 0 {
            return Err(RemoteFetchError::Command {
                command,
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let sequence: Sequence = output.stdout.parse().map_err(RemoteFetchError::Parse)?;
        self.local.write(&sequence).map_err(RemoteFetchError::LocalWrite)?;
        tracing::info!(host = %self.config.host, %sequence, "open sequence fetched");
        Ok(sequence)
    }

    /// [`fetch`](Self::fetch), degrading any failure to manual port entry.
    ///
    /// # Errors
    ///
    /// Only when manual entry itself is aborted.
    pub fn fetch_or_manual(
        &mut self,
        credentials: Credentials,
        prompter: &mut impl Prompter,
    ) -> Result<Sequence, ConfigError> {
        match self.fetch(credentials, prompter) {
            Ok(sequence) => Ok(sequence),
            Err(e) => {
                tracing::warn!(error = %e, "remote fetch failed, falling back to manual entry");
                let sequence = prompt_ports(prompter)?;
                if let Err(e) = self.local.write(&sequence) {
                    tracing::warn!(error = %e, "cannot store manually entered sequence");
                }
                Ok(sequence)
            },
        }
    }

    fn authenticate(
        &mut self,
        mut credentials: Credentials,
        prompter: &mut impl Prompter,
    ) -> Result<C::Session, RemoteFetchError> {
        let max = self.config.max_auth_attempts;

        for attempt in 1..=max {
            match self.connector.connect(&self.config, &credentials) {
                Ok(session) => return Ok(session),
                Err(e) if e.is_authentication() => {
                    tracing::warn!(attempt, max, "authentication rejected");
                    if attempt == max {
                        break;
                    }
                    if let Credentials::Password(_) = credentials {
                        let retry = prompter
                            .prompt_secret("The password is incorrect. Please try again: ")
                            .ok()
                            .flatten();
                        let Some(password) = retry else {
                            return Err(RemoteFetchError::Authentication { attempts: attempt });
                        };
                        credentials = Credentials::Password(password);
                    }
                },
                Err(e) => return Err(e),
            }
        }

        Err(RemoteFetchError::Authentication { attempts: max })
    }
}

/// SSH connector backed by libssh2.
#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

impl SshConnector {
    fn verify_host_key(session: &Session, config: &RemoteConfig) -> Result<(), RemoteFetchError> {
        let Some((key, _)) = session.host_key() else {
            return Err(RemoteFetchError::Connection("server sent no host key".to_string()));
        };

        let mut known = session.known_hosts().map_err(connection)?;
        if let Some(path) = config.known_hosts.as_deref().filter(|p| p.exists()) {
            known.read_file(path, KnownHostFileKind::OpenSSH).map_err(connection)?;
        }

        match known.check_port(&config.host, config.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::Mismatch => Err(RemoteFetchError::Connection(format!(
                "host key for {} does not match known_hosts",
                config.host
            ))),
            CheckResult::NotFound | CheckResult::Failure if !config.strict_host_keys => {
                tracing::warn!(host = %config.host, "host key not in known_hosts, accepting");
                Ok(())
            },
            CheckResult::NotFound | CheckResult::Failure => Err(RemoteFetchError::Connection(
                format!("host key for {} could not be verified", config.host),
            )),
        }
    }
}

impl RemoteConnector for SshConnector {
    type Session = SshSession;

    fn connect(
        &mut self,
        config: &RemoteConfig,
        credentials: &Credentials,
    ) -> Result<SshSession, RemoteFetchError> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(connection)?
            .next()
            .ok_or_else(|| {
                RemoteFetchError::Connection(format!("{} has no address", config.host))
            })?;
        let tcp = TcpStream::connect_timeout(&addr, config.timeout).map_err(connection)?;

        let mut session = Session::new().map_err(connection)?;
        session.set_timeout(u32::try_from(config.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(connection)?;
        Self::verify_host_key(&session, config)?;

        let username = config.username.as_str();
        let auth = match credentials {
            Credentials::Password(password) => session.userauth_password(username, password),
            Credentials::KeyFile { private_key, public_key, passphrase } => session
                .userauth_pubkey_file(
                    username,
                    public_key.as_deref(),
                    private_key,
                    passphrase.as_deref(),
                ),
            Credentials::Agent => session.userauth_agent(username),
        };

        if let Err(e) = auth {
            tracing::debug!(error = %e, "ssh authentication error");
        }
        if !session.authenticated() {
            return Err(RemoteFetchError::Authentication { attempts: 1 });
        }

        tracing::debug!(host = %config.host, port = config.port, "ssh session established");
        Ok(SshSession { session })
    }
}

/// Authenticated SSH session.
pub struct SshSession {
    session: Session,
}

impl RemoteSession for SshSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput, RemoteFetchError> {
        let mut channel = self.session.channel_session().map_err(connection)?;
        channel.exec(command).map_err(connection)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout).map_err(connection)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr).map_err(connection)?;

        channel.wait_close().map_err(connection)?;
        let status = channel.exit_status().map_err(connection)?;
        Ok(CommandOutput { status, stdout, stderr })
    }
}

fn connection(err: impl fmt::Display) -> RemoteFetchError {
    RemoteFetchError::Connection(err.to_string())
}
