//! Firewall publication: knockd configuration and service restart.
//!
//! The log-parsing service is a black box that re-reads whatever
//! configuration was last written, so reloading is a plain stop/start of
//! the service through the host's service manager.

use std::{
    fs,
    io::Write as _,
    path::{Path, PathBuf},
    process::Command,
};

use knockchain_core::Sequence;

use crate::error::ReloadError;

/// Service restarted after each publication.
pub const DEFAULT_SERVICE: &str = "knockd";

/// Default knockd configuration location.
pub const DEFAULT_KNOCKD_CONFIG: &str = "/etc/knockd.conf";

/// Restarts the firewall log parser so it picks up the new sequence.
pub trait FirewallReloader {
    /// Restart the service.
    fn reload(&mut self) -> Result<(), ReloadError>;
}

/// `None` skips the restart, for hosts where something else owns the
/// firewall service.
impl<R: FirewallReloader> FirewallReloader for Option<R> {
    fn reload(&mut self) -> Result<(), ReloadError> {
        match self {
            Some(reloader) => reloader.reload(),
            None => {
                tracing::debug!("firewall reload disabled");
                Ok(())
            },
        }
    }
}

/// Host service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceManager {
    /// `systemctl stop|start <service>`
    #[default]
    Systemd,
    /// `service <service> stop|start`
    SysV,
}

impl ServiceManager {
    /// Program and arguments for `action` (`stop` or `start`) on `service`.
    pub fn command(self, service: &str, action: &str) -> (&'static str, Vec<String>) {
        match self {
            Self::Systemd => ("systemctl", vec![action.to_string(), service.to_string()]),
            Self::SysV => ("service", vec![service.to_string(), action.to_string()]),
        }
    }
}

/// Reloads by stopping then starting the service.
///
/// Succeeds only if both commands exit zero; the start is not attempted
/// after a failed stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReloader {
    manager: ServiceManager,
    service: String,
    sudo: bool,
}

impl ServiceReloader {
    /// Reloader for `service`, optionally prefixing commands with `sudo`.
    pub fn new(manager: ServiceManager, service: impl Into<String>, sudo: bool) -> Self {
        Self { manager, service: service.into(), sudo }
    }

    /// Full command lines, in execution order.
    pub fn command_lines(&self) -> [Vec<String>; 2] {
        ["stop", "start"].map(|action| {
            let (program, args) = self.manager.command(&self.service, action);
            let mut line = Vec::with_capacity(args.len() + 2);
            if self.sudo {
                line.push("sudo".to_string());
            }
            line.push(program.to_string());
            line.extend(args);
            line
        })
    }
}

impl FirewallReloader for ServiceReloader {
    fn reload(&mut self) -> Result<(), ReloadError> {
        for line in self.command_lines() {
            let command = line.join(" ");
            let Some((program, args)) = line.split_first() else {
                continue;
            };

            let status = Command::new(program).args(args).status().map_err(|e| {
                ReloadError::Spawn { command: command.clone(), reason: e.to_string() }
            })?;

            if !status.success() {
                return Err(ReloadError::Failed { command, status: status.code() });
            }
            tracing::debug!(%command, "service command succeeded");
        }

        tracing::info!(service = %self.service, "firewall service restarted");
        Ok(())
    }
}

/// Settings for the rendered knockd configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnockdConfig {
    /// Where the configuration is written
    pub path: PathBuf,
    /// knockd's own log file
    pub log_file: PathBuf,
    /// Network interface knockd listens on
    pub interface: String,
    /// Port opened for the knocking host
    pub target_port: u16,
    /// Seconds allowed to complete the sequence
    pub seq_timeout: u32,
    /// Seconds between the start and stop commands
    pub cmd_timeout: u32,
}

impl Default for KnockdConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_KNOCKD_CONFIG),
            log_file: PathBuf::from("/var/log/knockd.log"),
            interface: "eth0".to_string(),
            target_port: 22,
            seq_timeout: 5,
            cmd_timeout: 5,
        }
    }
}

impl KnockdConfig {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), String> {
        let interface = self.interface.as_str();
        if interface.is_empty() || interface.chars().any(char::is_whitespace) {
            return Err(format!("invalid network interface {interface:?}"));
        }
        if self.seq_timeout == 0 || self.cmd_timeout == 0 {
            return Err("knockd timeouts must be non-zero".to_string());
        }
        Ok(())
    }

    /// Configuration text opening `target_port` for hosts knocking `sequence`.
    pub fn render(&self, sequence: &Sequence) -> String {
        let rule = |flag: char| {
            format!(
                "/sbin/iptables -{flag} INPUT -s %IP% -p tcp --dport {} -j ACCEPT",
                self.target_port
            )
        };

        format!(
            "[options]\n\
             \x20   logfile     = {log_file}\n\
             \x20   interface   = {interface}\n\
             \n\
             [opencloseSSH]\n\
             \x20   sequence                = {sequence}\n\
             \x20   seq_timeout             = {seq_timeout}\n\
             \x20   start_command           = {start}\n\
             \x20   tcpflags                = syn\n\
             \x20   cmd_timeout             = {cmd_timeout}\n\
             \x20   stop_command            = {stop}\n",
            log_file = self.log_file.display(),
            interface = self.interface,
            seq_timeout = self.seq_timeout,
            start = rule('I'),
            cmd_timeout = self.cmd_timeout,
            stop = rule('D'),
        )
    }

    /// Render for `sequence` and replace the file at [`Self::path`].
    pub fn write(&self, sequence: &Sequence) -> Result<(), ReloadError> {
        let write_error = |e: &std::io::Error| ReloadError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        };

        let staging = staging_path(&self.path);
        let mut file = fs::File::create(&staging).map_err(|e| write_error(&e))?;
        file.write_all(self.render(sequence).as_bytes()).map_err(|e| write_error(&e))?;
        file.sync_all().map_err(|e| write_error(&e))?;
        drop(file);
        fs::rename(&staging, &self.path).map_err(|e| write_error(&e))?;

        tracing::debug!(path = %self.path.display(), "knockd configuration written");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}
