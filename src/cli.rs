//! Shared CLI definitions for ftserver and ftclient

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use crate::client::ClientRequest;
use crate::command::Verb;

/// Serve the files of one directory over a control + data connection pair
#[derive(Clone, Debug, Parser)]
#[command(name = "ftserver", version)]
pub struct ServerOpts {
    /// Control port to listen on
    pub port: u16,

    /// Address to bind the control listener to [default: 0.0.0.0]
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory to serve [default: .]
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// TOML config file (bind, root, log_file, transfer_log, *_timeout_ms, reverse_dns)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append session events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Write one JSONL record per session to this file
    #[arg(long = "transfer-log")]
    pub transfer_log: Option<PathBuf>,

    /// Timeout for each data connection attempt, in milliseconds
    #[arg(long = "connect-timeout-ms")]
    pub connect_timeout_ms: Option<u64>,

    /// Socket read/write timeout in milliseconds (0 = none)
    #[arg(long = "io-timeout-ms")]
    pub io_timeout_ms: Option<u64>,

    /// Log client IPs instead of reverse-resolved host names
    #[arg(long = "no-reverse-dns")]
    pub no_reverse_dns: bool,

    /// Do not log session events to stderr
    #[arg(short, long)]
    pub quiet: bool,
}

/// Request a directory listing or a file from an ftserver
#[derive(Clone, Debug, Parser)]
#[command(
    name = "ftclient",
    version,
    override_usage = "ftclient <HOST> <PORT> -l <DATA_PORT>\n       ftclient <HOST> <PORT> -g <FILENAME> <DATA_PORT>"
)]
pub struct ClientOpts {
    /// Server host
    pub host: String,

    /// Server control port
    pub port: u16,

    /// -l (list) or -g (get)
    #[arg(allow_hyphen_values = true)]
    pub command: String,

    /// [FILENAME] DATA_PORT
    #[arg(num_args = 1..=2, required = true)]
    pub rest: Vec<String>,

    /// Save a fetched file here instead of ./FILENAME
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ClientOpts {
    pub fn request(&self) -> Result<ClientRequest> {
        let Some(verb) = Verb::from_token(&self.command) else {
            bail!("unknown command {:?} (expected -l or -g)", self.command);
        };
        let (filename, data_port) = match (verb, self.rest.as_slice()) {
            (Verb::List, [port]) => (None, port),
            (Verb::Get, [name, port]) => (Some(name.clone()), port),
            (Verb::List, _) => bail!("-l takes exactly one argument: <DATA_PORT>"),
            (Verb::Get, _) => bail!("-g takes exactly two arguments: <FILENAME> <DATA_PORT>"),
        };
        let data_port: u16 = match data_port.parse() {
            Ok(p) if p != 0 => p,
            _ => bail!("invalid data port {:?}", data_port),
        };
        Ok(ClientRequest {
            host: self.host.clone(),
            port: self.port,
            verb,
            filename,
            data_port,
        })
    }
}
