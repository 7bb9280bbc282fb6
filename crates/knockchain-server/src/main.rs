//! Knockchain server binary.
//!
//! # Usage
//!
//! ```bash
//! # Create the ledger and write its seed entry
//! KNOCKCHAIN_SALT=... knockchain-server init
//!
//! # Rotate once: derive, publish, rewrite /etc/knockd.conf, restart knockd
//! knockchain-server generate --knockd-config /etc/knockd.conf --interface eth0
//!
//! # Rotate at the top of every hour until SIGTERM
//! knockchain-server run --pid-file /run/knockchain.pid --knockd-config /etc/knockd.conf
//! ```

use std::{future::Future, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};
use knockchain_core::{
    DEFAULT_EXCLUDED_PORTS, DerivationConfig, FileLedger, LedgerPassword, MAX_PORT_LIMIT,
    PortSpace, Prompter, Salt, SequenceDeriver, SequenceSource, SystemEnv, TerminalPrompter,
    generate_salt,
    prompt::{prompt_ledger_password, prompt_passphrase},
};
use knockchain_server::{
    DaemonConfig, DaemonScheduler, KnockdConfig, PidFile, ServiceManager, ServiceReloader,
    firewall::DEFAULT_SERVICE,
};
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Knockchain sequence rotation server
#[derive(Parser, Debug)]
#[command(name = "knockchain-server")]
#[command(about = "Rotates the port-knocking sequence and reloads the firewall")]
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
    /// Create the ledger file and write its seed entry
    Init(LedgerArgs),
    /// Derive one sequence, publish it and reload the firewall
    Generate(RotateArgs),
    /// Rotate on every interval boundary until SIGTERM or SIGINT
    Run(RunArgs),
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

    fn open_deriver(
        &self,
    ) -> Result<SequenceDeriver<FileLedger<SystemEnv>, SystemEnv>, Box<dyn std::error::Error>>
    {
        let env = SystemEnv::new();
        let config = self.derivation_config()?;
        let password = self.password(&mut TerminalPrompter)?;
        let ledger = FileLedger::open(&self.ledger, &password, env.clone())?;
        Ok(SequenceDeriver::new(config, ledger, env)?)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ServiceManagerArg {
    /// systemctl
    Systemd,
    /// service(8)
    Sysv,
}

#[derive(Args, Debug)]
struct RotateArgs {
    #[command(flatten)]
    ledger: LedgerArgs,

    /// Published sequence file read by lightweight clients
    #[arg(long, default_value = "open_sequence")]
    sequence_file: PathBuf,

    /// Render the knockd configuration to this file on every rotation
    #[arg(long)]
    knockd_config: Option<PathBuf>,

    /// Network interface knockd listens on
    #[arg(long, default_value = "eth0")]
    interface: String,

    /// Port opened for a host that knocked the sequence
    #[arg(long, default_value_t = 22)]
    target_port: u16,

    /// Firewall service restarted after publishing
    #[arg(long, default_value = DEFAULT_SERVICE)]
    service: String,

    /// Service manager used for the restart
    #[arg(long, value_enum, default_value_t = ServiceManagerArg::Systemd)]
    service_manager: ServiceManagerArg,

    /// Run service commands without sudo
    #[arg(long)]
    no_sudo: bool,

    /// Publish only; do not restart the firewall service
    #[arg(long)]
    no_reload: bool,
}

impl RotateArgs {
    fn daemon_config(&self, interval: Duration) -> DaemonConfig {
        DaemonConfig {
            interval,
            sequence_file: self.sequence_file.clone(),
            knockd: self.knockd_config.as_ref().map(|path| KnockdConfig {
                path: path.clone(),
                interface: self.interface.clone(),
                target_port: self.target_port,
                ..KnockdConfig::default()
            }),
        }
    }

    fn reloader(&self) -> Option<ServiceReloader> {
        if self.no_reload {
            return None;
        }
        let manager = match self.service_manager {
            ServiceManagerArg::Systemd => ServiceManager::Systemd,
            ServiceManagerArg::Sysv => ServiceManager::SysV,
        };
        Some(ServiceReloader::new(manager, self.service.clone(), !self.no_sudo))
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    rotate: RotateArgs,

    /// Seconds between rotations; cycles start on multiples of it
    #[arg(long, default_value_t = 3600)]
    interval: u64,

    /// Pid file held while the daemon runs
    #[arg(long, default_value = "knockchain-server.pid")]
    pid_file: PathBuf,
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
        Command::Init(args) => init(&args),
        Command::Generate(args) => generate(&args),
        Command::Run(args) => run(args).await,
        Command::GenerateSalt { len } => {
            print_salt(len);
            Ok(())
        },
    }
}

fn init(args: &LedgerArgs) -> Result<(), Box<dyn std::error::Error>> {
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

fn generate(args: &RotateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let deriver = args.ledger.open_deriver()?;
    let config = args.daemon_config(knockchain_server::DEFAULT_INTERVAL);
    let mut scheduler = DaemonScheduler::new(config, deriver, args.reloader(), SystemEnv::new())?;

    let outcome = scheduler.run_cycle()?;
    tracing::info!(sequence = %outcome.sequence, "sequence published");
    outcome.reload?;
    Ok(())
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let pid_file = PidFile::acquire(&args.pid_file)?;
    tracing::info!(pid = pid_file.pid(), path = %pid_file.path().display(), "pid file written");

    let deriver = args.rotate.ledger.open_deriver()?;
    let config = args.rotate.daemon_config(Duration::from_secs(args.interval));
    let reloader = args.rotate.reloader();
    let mut scheduler = DaemonScheduler::new(config, deriver, reloader, SystemEnv::new())?;

    let result = scheduler.run(shutdown_signal()?).await;
    drop(pid_file);
    result?;
    Ok(())
}

fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
    })
}

#[allow(clippy::print_stdout)]
fn print_salt(len: usize) {
    println!("{}", generate_salt(len, &SystemEnv::new()));
}
