//! Server configuration: optional TOML file merged under CLI flags

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::ServerOpts;
use crate::protocol::timeouts;

/// On-disk configuration. Every key is optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub root: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub transfer_log: Option<PathBuf>,
    pub connect_timeout_ms: Option<u64>,
    pub io_timeout_ms: Option<u64>,
    pub reverse_dns: Option<bool>,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }
}

/// Socket timeouts for one session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Per-attempt timeout when dialing the data port
    pub connect: Duration,
    /// Read/write timeout on control and data sockets; `None` blocks forever
    pub io: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(timeouts::CONNECT_MS),
            io: Some(Duration::from_millis(timeouts::IO_MS)),
        }
    }
}

impl Timeouts {
    // 0 disables the io timeout; a zero connect timeout is not allowed by the OS
    fn from_millis(connect_ms: u64, io_ms: u64) -> Self {
        Self {
            connect: Duration::from_millis(connect_ms.max(1)),
            io: (io_ms > 0).then(|| Duration::from_millis(io_ms)),
        }
    }
}

/// Fully resolved settings the server runs with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub root: PathBuf,
    pub log_file: Option<PathBuf>,
    pub transfer_log: Option<PathBuf>,
    pub timeouts: Timeouts,
    /// Name clients by reverse DNS in the connection log
    pub reverse_dns: bool,
    pub quiet: bool,
}

impl Settings {
    /// CLI flag wins over the config file, which wins over the default.
    pub fn resolve(opts: &ServerOpts, file: ServerConfig) -> Self {
        let connect_ms = opts
            .connect_timeout_ms
            .or(file.connect_timeout_ms)
            .unwrap_or(timeouts::CONNECT_MS);
        let io_ms = opts
            .io_timeout_ms
            .or(file.io_timeout_ms)
            .unwrap_or(timeouts::IO_MS);
        Self {
            bind: opts
                .bind
                .clone()
                .or(file.bind)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: opts.port,
            root: opts
                .root
                .clone()
                .or(file.root)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_file: opts.log_file.clone().or(file.log_file),
            transfer_log: opts.transfer_log.clone().or(file.transfer_log),
            timeouts: Timeouts::from_millis(connect_ms, io_ms),
            reverse_dns: !opts.no_reverse_dns && file.reverse_dns.unwrap_or(true),
            quiet: opts.quiet,
        }
    }

    pub fn load(opts: &ServerOpts) -> Result<Self> {
        let file = match opts.config {
            Some(ref p) => ServerConfig::load(p)?,
            None => ServerConfig::default(),
        };
        Ok(Self::resolve(opts, file))
    }
}
