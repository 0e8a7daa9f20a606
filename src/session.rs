//! The session loop: accept one control connection, read one command,
//! validate it, dial the client's data port, transfer, close, repeat.
//!
//! Clients are served strictly one after another. Each iteration owns its
//! control stream, its parsed command and (if opened) its data channel, and
//! all of them are released before the next `accept`. Failures of a single
//! session are logged and never stop the loop.

use anyhow::{Context, Result};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;

use crate::command::{check_command, parse_command, RawCommand, Verb};
use crate::config::Timeouts;
use crate::data_channel::{DataChannel, HostResolver, PeerAddrResolver};
use crate::error::SessionError;
use crate::fs_enum::{DirLister, DirectoryLister};
use crate::log::{TransferLog, TransferLogEntry, TransferStatus};
use crate::logger::{Logger, NoopLogger};
use crate::protocol::{reply, MAX_CONTROL_MESSAGE};
use crate::transfer;

/// Bind the control listener on `bind:port`.
pub fn bind_listener(bind: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((bind, port)).with_context(|| format!("bind {}:{}", bind, port))
}

/// How a session iteration ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// Peer closed the control connection without sending a command
    Disconnected,
    Listed { bytes: u64, dropped: usize },
    Sent { bytes: u64 },
    Failed(SessionError),
}

#[derive(Debug)]
pub struct SessionReport {
    pub peer: SocketAddr,
    /// Display name from the resolver; the data leg dials `data_host`
    pub host: String,
    pub command: Option<RawCommand>,
    pub data_channel_opened: bool,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    fn log_entry(&self) -> TransferLogEntry {
        let status = match &self.outcome {
            SessionOutcome::Listed { .. } | SessionOutcome::Sent { .. } => TransferStatus::Completed,
            SessionOutcome::Failed(SessionError::IncorrectCommand(_)) => TransferStatus::Rejected,
            SessionOutcome::Failed(SessionError::FileNotFound(_)) => TransferStatus::NotFound,
            SessionOutcome::Failed(_) | SessionOutcome::Disconnected => TransferStatus::Failed,
        };
        let mut entry = TransferLogEntry::new(self.peer.to_string(), status);
        if let Some(ref cmd) = self.command {
            entry.verb = Some(cmd.verb.clone());
            if cmd.verb() == Some(Verb::Get) {
                entry.filename = Some(cmd.filename.clone());
            }
        }
        entry.bytes_sent = match self.outcome {
            SessionOutcome::Listed { bytes, .. } | SessionOutcome::Sent { bytes } => bytes,
            _ => 0,
        };
        entry.error = match &self.outcome {
            SessionOutcome::Failed(e) => Some(e.to_string()),
            SessionOutcome::Disconnected => Some("disconnected before command".to_string()),
            _ => None,
        };
        entry
    }
}

pub struct Server {
    listener: TcpListener,
    lister: Box<dyn DirectoryLister + Send>,
    resolver: Box<dyn HostResolver + Send>,
    logger: Arc<dyn Logger>,
    transfer_log: Option<TransferLog>,
    timeouts: Timeouts,
}

impl Server {
    pub fn new<P: Into<PathBuf>>(listener: TcpListener, root: P) -> Self {
        Self {
            listener,
            lister: Box::new(DirLister::new(root)),
            resolver: Box::new(PeerAddrResolver),
            logger: Arc::new(NoopLogger),
            transfer_log: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_transfer_log(mut self, log: TransferLog) -> Self {
        self.transfer_log = Some(log);
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_lister<L: DirectoryLister + Send + 'static>(mut self, lister: L) -> Self {
        self.lister = Box::new(lister);
        self
    }

    pub fn with_resolver<H: HostResolver + Send + 'static>(mut self, resolver: H) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve clients until the process is stopped.
    pub fn run(&self) -> Result<()> {
        self.logger.listening(self.local_addr()?, self.lister.root());
        for conn in self.listener.incoming() {
            match conn {
                Ok(stream) => {
                    let peer = match stream.peer_addr() {
                        Ok(p) => p,
                        Err(e) => {
                            self.logger.server_error("accept", &e.to_string());
                            continue;
                        }
                    };
                    self.handle_session(stream, peer);
                }
                Err(e) => self.logger.server_error("accept", &e.to_string()),
            }
        }
        Ok(())
    }

    /// Accept and serve exactly one client.
    pub fn serve_one(&self) -> io::Result<SessionReport> {
        let (stream, peer) = self.listener.accept()?;
        Ok(self.handle_session(stream, peer))
    }

    fn handle_session(&self, mut control: TcpStream, peer: SocketAddr) -> SessionReport {
        let host = self.resolver.resolve_client_hostname(peer.ip());
        self.logger.connection(peer, &host);

        let mut report = SessionReport {
            peer,
            host,
            command: None,
            data_channel_opened: false,
            outcome: SessionOutcome::Disconnected,
        };
        report.outcome = match self.run_session(&mut control, &mut report) {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_client_visible() {
                    self.logger.rejected(peer, &e);
                } else {
                    self.logger.session_error(peer, &e);
                }
                SessionOutcome::Failed(e)
            }
        };

        // Closing
        let _ = control.shutdown(Shutdown::Both);
        drop(control);

        if let Some(ref log) = self.transfer_log {
            if let Err(e) = log.add_entry(&report.log_entry()) {
                self.logger.server_error("transfer-log", &format!("{}: {:#}", log.path().display(), e));
            }
        }
        report
    }

    fn run_session(
        &self,
        control: &mut TcpStream,
        report: &mut SessionReport,
    ) -> Result<SessionOutcome, SessionError> {
        control.set_read_timeout(self.timeouts.io)?;
        control.set_write_timeout(self.timeouts.io)?;

        // AwaitCommand
        let Some(line) = read_control_message(control)? else {
            return Ok(SessionOutcome::Disconnected);
        };
        let raw = parse_command(&line);
        self.logger.command(report.peer, &raw);
        report.command = Some(raw.clone());

        // Validating
        let verb = raw.verb.clone();
        let Some(cmd) = check_command(raw, control)? else {
            return Err(SessionError::IncorrectCommand(verb));
        };

        // Transferring
        let target = self.resolver.data_host(report.peer.ip());
        let mut data = DataChannel::open(&target, &cmd.data_port, &self.timeouts)?;
        report.data_channel_opened = true;
        let result = match cmd.verb {
            Verb::List => transfer::send_listing(&*self.lister, &mut data).map(|listing| {
                if listing.dropped > 0 {
                    self.logger.listing_truncated(report.peer, listing.dropped);
                }
                SessionOutcome::Listed {
                    bytes: listing.payload.len() as u64,
                    dropped: listing.dropped,
                }
            }),
            Verb::Get => {
                transfer::send_requested_file(&cmd.filename, &*self.lister, &mut data, control)
                    .map(|bytes| SessionOutcome::Sent { bytes })
            }
        };
        data.close();

        if matches!(result, Err(SessionError::Unreadable { .. })) {
            let _ = control
                .write_all(reply::FILE_UNREADABLE)
                .and_then(|_| control.flush());
        }
        if let Ok(SessionOutcome::Listed { bytes, .. } | SessionOutcome::Sent { bytes }) = &result {
            self.logger.transfer_done(report.peer, cmd.verb, &cmd.filename, *bytes);
        }
        result
    }
}

/// One bounded read of the control message.
///
/// Returns `None` when the peer closed without sending anything. A single
/// trailing `\n` or `\r\n` is removed; the payload is otherwise untouched.
pub fn read_control_message<R: Read>(control: &mut R) -> io::Result<Option<String>> {
    let mut buf = [0u8; MAX_CONTROL_MESSAGE];
    let n = loop {
        match control.read(&mut buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    };
    if n == 0 {
        return Ok(None);
    }
    let mut msg = &buf[..n];
    if let Some(rest) = msg.strip_suffix(b"\n") {
        msg = rest.strip_suffix(b"\r").unwrap_or(rest);
    }
    Ok(Some(String::from_utf8_lossy(msg).into_owned()))
}
