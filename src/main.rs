//! ftserver - serve one directory to one client at a time
//!
//! Usage: ftserver <PORT>
//!
//! Exit codes: 1 for bad arguments, 2 when the control listener cannot be
//! set up. Once listening, the server only stops on a signal.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use std::sync::Arc;

use ftserve::cli::ServerOpts;
use ftserve::config::Settings;
use ftserve::data_channel::{PeerAddrResolver, ReverseDnsResolver};
use ftserve::log::TransferLog;
use ftserve::logger::{ConsoleLogger, FanoutLogger, Logger, NoopLogger, TextLogger};
use ftserve::session::{bind_listener, Server};

fn main() {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Exiting (Ctrl-C)...");
        std::process::exit(130);
    })
    .unwrap_or_else(|e| eprintln!("warning: cannot install Ctrl-C handler: {}", e));

    let opts = match ServerOpts::try_parse() {
        Ok(o) => o,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let settings = match Settings::load(&opts) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = serve(settings) {
        eprintln!("Error: {:#}", e);
        std::process::exit(2);
    }
}

fn serve(settings: Settings) -> Result<()> {
    if !settings.root.is_dir() {
        anyhow::bail!("root is not a directory: {}", settings.root.display());
    }
    let root = std::fs::canonicalize(&settings.root)
        .with_context(|| format!("canonicalize root {}", settings.root.display()))?;

    let mut loggers: Vec<Arc<dyn Logger>> = Vec::new();
    if !settings.quiet {
        loggers.push(Arc::new(ConsoleLogger));
    }
    if let Some(ref p) = settings.log_file {
        let file = TextLogger::new(p).with_context(|| format!("open log file {}", p.display()))?;
        loggers.push(Arc::new(file));
    }
    let logger: Arc<dyn Logger> = match loggers.len() {
        0 => Arc::new(NoopLogger),
        1 => loggers.remove(0),
        _ => Arc::new(FanoutLogger::new(loggers)),
    };

    let listener = bind_listener(&settings.bind, settings.port)?;
    let mut server = Server::new(listener, root)
        .with_logger(logger)
        .with_timeouts(settings.timeouts);
    if settings.reverse_dns {
        server = server.with_resolver(ReverseDnsResolver);
    } else {
        server = server.with_resolver(PeerAddrResolver);
    }
    if let Some(p) = settings.transfer_log {
        let log = TransferLog::new(p);
        // Refuse to append to something that is not a transfer log
        log.read_log()
            .with_context(|| format!("check transfer log {}", log.path().display()))?;
        server = server.with_transfer_log(log);
    }
    server.run()
}
