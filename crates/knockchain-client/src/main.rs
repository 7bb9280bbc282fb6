//! Knockchain client binary.
//!
//! # Usage
//!
//! ```bash
//! # Symmetric mode: derive the next sequence from the shared ledger and knock
//! KNOCKCHAIN_SALT=... knockchain knock --server 192.168.1.100
//!
//! # Lightweight mode: fetch the published sequence over SSH, then knock
//! knockchain fetch --server 192.168.1.100 --user knock
//!
//! # Knock a fixed sequence without touching any ledger
//! knockchain knock --salt ... --open-sequence 41223 9981 63004
//! ```

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use knockchain_client::{
    CloseMode, Credentials, KnockConfig, KnockTransmitter, RemoteConfig, RemoteSequenceFetcher,
    SshConnector, TcpKnocker, remote::DEFAULT_MAX_AUTH_ATTEMPTS,
};
use knockchain_core::{
    DEFAULT_EXCLUDED_PORTS, DerivationConfig, FileLedger, LedgerPassword, MAX_PORT_LIMIT,
    MemoryLedger, PortSpace, Prompter, Salt, Sequence, SequenceDeriver, SequenceError,
    SequenceFile, SequenceSource, SystemEnv, TerminalPrompter, generate_salt,
    prompt::{prompt_ledger_password, prompt_passphrase},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Knockchain port-knocking client
#[derive(Parser, Debug)]
#[command(name = "knockchain")]
#[command(about = "Port-knocking client with a chained, ledger-backed sequence")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Obtain an open sequence locally and run a knock cycle
    Knock(KnockArgs),
    /// Fetch the published sequence from the server and run a knock cycle
    Fetch(FetchArgs),
    /// Create the ledger file and write its seed entry
    InitLedger(LedgerArgs),
    /// Print a random salt and exit
    GenerateSalt {
        /// Salt length in characters
        len: usize,
    },
}

#[derive(Args, Debug)]
struct LedgerArgs {
    /// Ledger file
    #[arg(long, default_value = "knockchain.ledger")]
    ledger: PathBuf,

    /// Shared salt
    #[arg(long, env = "KNOCKCHAIN_SALT", hide_env_values = true)]
    salt: String,

    /// Ledger password (8 bytes); prompted when absent
    #[arg(long, env = "KNOCKCHAIN_LEDGER_PASSWORD", hide_env_values = true)]
    ledger_password: Option<String>,

    /// Lowest usable port (inclusive)
    #[arg(long, default_value_t = 0)]
    min_port: u32,

    /// Port range end (exclusive)
    #[arg(long, default_value_t = MAX_PORT_LIMIT)]
    max_port: u32,

    /// Ports never used in a sequence
    #[arg(
        long,
        num_args = 1..,
        value_delimiter = ',',
        default_values_t = DEFAULT_EXCLUDED_PORTS
    )]
    excluded_ports: Vec<u16>,
}

impl LedgerArgs {
    fn derivation_config(&self) -> Result<DerivationConfig, Box<dyn std::error::Error>> {
        let port_space =
            PortSpace::new(self.min_port, self.max_port, self.excluded_ports.iter().copied())?;
        Ok(DerivationConfig {
            salt: Salt::new(self.salt.clone())?,
            port_space,
            source: SequenceSource::Chained,
        })
    }

    fn password(
        &self,
        prompter: &mut impl Prompter,
    ) -> Result<LedgerPassword, Box<dyn std::error::Error>> {
        match &self.ledger_password {
            Some(password) => Ok(LedgerPassword::new(password.clone())?),
            None => Ok(prompt_ledger_password(prompter)?),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CloseModeArg {
    /// Close after `--delay` seconds
    Auto,
    /// Close after pressing enter
    Manual,
}

#[derive(Args, Debug)]
struct TransmitArgs {
    /// Server address: IPv4, IPv6 or DNS name
    #[arg(long, default_value = "server.local")]
    server: String,

    /// Per-knock connect timeout in milliseconds
    #[arg(long, default_value_t = 300)]
    timeout_ms: u64,

    /// Pause between knocks in milliseconds
    #[arg(long, default_value_t = 100)]
    gap_ms: u64,

    /// Close sequence
    #[arg(
        long,
        num_args = 3,
        value_names = ["P1", "P2", "P3"],
        default_values_t = [10000u16, 20000, 30000]
    )]
    close_sequence: Vec<u16>,

    /// When to send the close sequence
    #[arg(long, value_enum, default_value_t = CloseModeArg::Auto)]
    close_mode: CloseModeArg,

    /// Seconds between open and close sequences (auto mode)
    #[arg(long, default_value_t = 5)]
    delay: u64,
}

impl TransmitArgs {
    fn knock_config(&self) -> Result<KnockConfig, SequenceError> {
        Ok(KnockConfig {
            host: self.server.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            gap: Duration::from_millis(self.gap_ms),
            close_sequence: to_sequence(&self.close_sequence)?,
            close_mode: match self.close_mode {
                CloseModeArg::Auto => CloseMode::Auto(Duration::from_secs(self.delay)),
                CloseModeArg::Manual => CloseMode::Manual,
            },
        })
    }
}

#[derive(Args, Debug)]
struct KnockArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    #[command(flatten)]
    transmit: TransmitArgs,

    /// Use uniformly random ports; the ledger is not touched
    #[arg(long, conflicts_with = "open_sequence")]
    random: bool,

    /// Knock this open sequence; the ledger is not touched
    #[arg(long, num_args = 3, value_names = ["P1", "P2", "P3"])]
    open_sequence: Option<Vec<u16>>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[command(flatten)]
    transmit: TransmitArgs,

    /// Remote account
    #[arg(long)]
    user: String,

    /// Remote SSH port
    #[arg(long, default_value_t = 22)]
    ssh_port: u16,

    /// Sequence file path on the server
    #[arg(long, default_value = "open_sequence")]
    remote_path: String,

    /// Local copy of the fetched sequence
    #[arg(long, default_value = "open_sequence")]
    sequence_file: PathBuf,

    /// Private key to authenticate with instead of a password
    #[arg(long, conflicts_with = "agent")]
    identity: Option<PathBuf>,

    /// Authenticate with the running SSH agent
    #[arg(long)]
    agent: bool,

    /// `known_hosts` file (default: ~/.ssh/known_hosts)
    #[arg(long)]
    known_hosts: Option<PathBuf>,

    /// Refuse hosts missing from `known_hosts`
    #[arg(long)]
    strict_host_keys: bool,

    /// Authentication attempts before falling back to manual entry
    #[arg(long, default_value_t = DEFAULT_MAX_AUTH_ATTEMPTS)]
    max_auth_attempts: u32,
}

fn to_sequence(ports: &[u16]) -> Result<Sequence, SequenceError> {
    <[u16; 3]>::try_from(ports)
        .map(Sequence::new)
        .map_err(|_| SequenceError::WrongLength { expected: 3, actual: ports.len() })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Command::Knock(args) => knock(args).await,
        Command::Fetch(args) => fetch(args).await,
        Command::InitLedger(args) => init_ledger(&args),
        Command::GenerateSalt { len } => {
            print_salt(len);
            Ok(())
        },
    }
}

async fn knock(args: KnockArgs) -> Result<(), Box<dyn std::error::Error>> {
    let env = SystemEnv::new();
    let mut prompter = TerminalPrompter;
    let mut config = args.ledger.derivation_config()?;

    let sequence = if args.random || args.open_sequence.is_some() {
        config.source = match &args.open_sequence {
            Some(ports) => SequenceSource::Static(to_sequence(ports)?),
            None => SequenceSource::Random,
        };
        SequenceDeriver::new(config, MemoryLedger::new(), env.clone())?.derive()?
    } else {
        let password = args.ledger.password(&mut prompter)?;
        let ledger = FileLedger::open(&args.ledger.ledger, &password, env.clone())?;
        // Ledger lock is released before the cycle starts.
        SequenceDeriver::new(config, ledger, env.clone())?.next_sequence(&mut prompter)?
    };
    tracing::info!(%sequence, "open sequence ready");

    let knock_config = args.transmit.knock_config()?;
    let knocker = TcpKnocker::new(knock_config.timeout);
    let mut transmitter = KnockTransmitter::new(knock_config, knocker, env)?;
    transmitter.run_cycle(&sequence, &mut prompter).await?;

    tracing::info!("knock cycle complete");
    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut prompter = TerminalPrompter;

    let known_hosts = args.known_hosts.clone().or_else(|| {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".ssh").join("known_hosts"))
    });
    let config = RemoteConfig {
        host: args.transmit.server.clone(),
        port: args.ssh_port,
        username: args.user.clone(),
        remote_path: args.remote_path.clone(),
        max_auth_attempts: args.max_auth_attempts,
        known_hosts,
        strict_host_keys: args.strict_host_keys,
        ..RemoteConfig::default()
    };

    let credentials = if let Some(private_key) = args.identity.clone() {
        Credentials::KeyFile { private_key, public_key: None, passphrase: None }
    } else if args.agent {
        Credentials::Agent
    } else {
        let password = prompter
            .prompt_secret("Account password (leave empty to use SSH agent keys): ")?
            .unwrap_or_default();
        if password.is_empty() { Credentials::Agent } else { Credentials::Password(password) }
    };

    let local = SequenceFile::new(&args.sequence_file);
    let mut fetcher = RemoteSequenceFetcher::new(config, SshConnector, local)?;
    let sequence = fetcher.fetch_or_manual(credentials, &mut prompter)?;
    tracing::info!(%sequence, "open sequence ready");

    let knock_config = args.transmit.knock_config()?;
    let knocker = TcpKnocker::new(knock_config.timeout);
    let mut transmitter = KnockTransmitter::new(knock_config, knocker, SystemEnv::new())?;
    transmitter.run_cycle(&sequence, &mut prompter).await?;

    tracing::info!("knock cycle complete");
    Ok(())
}

fn init_ledger(args: &LedgerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut prompter = TerminalPrompter;
    let config = args.derivation_config()?;
    let password = args.password(&mut prompter)?;

    let ledger = FileLedger::create(&args.ledger, &password, SystemEnv::new())?;
    let mut deriver = SequenceDeriver::new(config, ledger, SystemEnv::new())?;
    let passphrase = prompt_passphrase(&mut prompter)?;
    deriver.initialize(&passphrase)?;

    tracing::info!(path = %args.ledger.display(), "ledger initialized");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_salt(len: usize) {
    println!("{}", generate_salt(len, &SystemEnv::new()));
}
