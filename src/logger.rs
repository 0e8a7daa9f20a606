use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use crate::command::{RawCommand, Verb};
use crate::error::SessionError;

pub trait Logger: Send + Sync {
    fn listening(&self, _addr: SocketAddr, _root: &Path) {}
    fn connection(&self, _peer: SocketAddr, _host: &str) {}
    fn command(&self, _peer: SocketAddr, _cmd: &RawCommand) {}
    fn rejected(&self, _peer: SocketAddr, _err: &SessionError) {}
    fn transfer_done(&self, _peer: SocketAddr, _verb: Verb, _name: &str, _bytes: u64) {}
    fn listing_truncated(&self, _peer: SocketAddr, _dropped: usize) {}
    fn session_error(&self, _peer: SocketAddr, _err: &SessionError) {}
    fn server_error(&self, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

fn stamp(s: &str) -> String {
    format!("[{}] {}", Utc::now().to_rfc3339(), s)
}

/// Destination for formatted event lines; console and file output share
/// one format through the blanket `Logger` impl below.
pub trait LineSink: Send + Sync {
    fn line(&self, s: &str);
}

impl<T: LineSink> Logger for T {
    fn listening(&self, addr: SocketAddr, root: &Path) {
        self.line(&format!("LISTEN addr={} root={}", addr, root.display()));
    }
    fn connection(&self, peer: SocketAddr, host: &str) {
        self.line(&format!("CONNECT peer={} host={}", peer, host));
    }
    fn command(&self, peer: SocketAddr, cmd: &RawCommand) {
        self.line(&format!(
            "COMMAND peer={} data_port={:?} verb={:?} filename={:?}",
            peer, cmd.data_port, cmd.verb, cmd.filename
        ));
    }
    fn rejected(&self, peer: SocketAddr, err: &SessionError) {
        self.line(&format!("REJECT peer={} kind={} msg={}", peer, err.kind(), err));
    }
    fn transfer_done(&self, peer: SocketAddr, verb: Verb, name: &str, bytes: u64) {
        self.line(&format!(
            "SENT peer={} verb={} name={:?} bytes={}",
            peer,
            verb.as_token(),
            name,
            bytes
        ));
    }
    fn listing_truncated(&self, peer: SocketAddr, dropped: usize) {
        self.line(&format!("TRUNCATE peer={} dropped_entries={}", peer, dropped));
    }
    fn session_error(&self, peer: SocketAddr, err: &SessionError) {
        self.line(&format!("ERROR peer={} kind={} msg={}", peer, err.kind(), err));
    }
    fn server_error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
}

/// Session events on stderr
pub struct ConsoleLogger;

impl LineSink for ConsoleLogger {
    fn line(&self, s: &str) {
        eprintln!("{}", stamp(s));
    }
}

/// Session events appended to a file
pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }
}

impl LineSink for TextLogger {
    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "{}", stamp(s));
    }
}

/// Forwards every event to each inner logger in order
pub struct FanoutLogger {
    inner: Vec<Arc<dyn Logger>>,
}

impl FanoutLogger {
    pub fn new(inner: Vec<Arc<dyn Logger>>) -> Self {
        Self { inner }
    }
}

impl Logger for FanoutLogger {
    fn listening(&self, addr: SocketAddr, root: &Path) {
        self.inner.iter().for_each(|l| l.listening(addr, root));
    }
    fn connection(&self, peer: SocketAddr, host: &str) {
        self.inner.iter().for_each(|l| l.connection(peer, host));
    }
    fn command(&self, peer: SocketAddr, cmd: &RawCommand) {
        self.inner.iter().for_each(|l| l.command(peer, cmd));
    }
    fn rejected(&self, peer: SocketAddr, err: &SessionError) {
        self.inner.iter().for_each(|l| l.rejected(peer, err));
    }
    fn transfer_done(&self, peer: SocketAddr, verb: Verb, name: &str, bytes: u64) {
        self.inner
            .iter()
            .for_each(|l| l.transfer_done(peer, verb, name, bytes));
    }
    fn listing_truncated(&self, peer: SocketAddr, dropped: usize) {
        self.inner.iter().for_each(|l| l.listing_truncated(peer, dropped));
    }
    fn session_error(&self, peer: SocketAddr, err: &SessionError) {
        self.inner.iter().for_each(|l| l.session_error(peer, err));
    }
    fn server_error(&self, context: &str, msg: &str) {
        self.inner.iter().for_each(|l| l.server_error(context, msg));
    }
}
