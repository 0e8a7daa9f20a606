//! Client side of the protocol.
//!
//! The client binds its data listener before it sends the command, so the
//! server's connect can never race ahead of it. A data port of 0 binds an
//! ephemeral port and advertises whatever the OS picked.

use anyhow::{anyhow, bail, Context, Result};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crate::command::Verb;
use crate::protocol::reply;

/// Time to wait for the server to dial the data port
pub const DATA_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientRequest {
    pub host: String,
    pub port: u16,
    pub verb: Verb,
    pub filename: Option<String>,
    pub data_port: u16,
}

impl ClientRequest {
    pub fn list(host: &str, port: u16, data_port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            verb: Verb::List,
            filename: None,
            data_port,
        }
    }

    pub fn get(host: &str, port: u16, filename: &str, data_port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            verb: Verb::Get,
            filename: Some(filename.to_string()),
            data_port,
        }
    }

    /// The control line for a given advertised data port
    pub fn control_line(&self, data_port: u16) -> String {
        match self.filename {
            Some(ref name) => format!("{} {} {}", data_port, self.verb.as_token(), name),
            None => format!("{} {}", data_port, self.verb.as_token()),
        }
    }
}

/// Text the server sent instead of (or after) the acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ServerReply(pub String);

struct Exchange {
    control: TcpStream,
    listener: TcpListener,
}

fn start(req: &ClientRequest) -> Result<Exchange> {
    let listener = TcpListener::bind(("0.0.0.0", req.data_port))
        .with_context(|| format!("bind data port {}", req.data_port))?;
    let data_port = listener.local_addr()?.port();

    let mut control = TcpStream::connect((req.host.as_str(), req.port))
        .with_context(|| format!("connect {}:{}", req.host, req.port))?;
    control
        .write_all(req.control_line(data_port).as_bytes())
        .context("send command")?;

    let mut first = [0u8; 1];
    let n = control.read(&mut first).context("read acknowledgment")?;
    if n == 0 {
        bail!("server closed the control connection without replying");
    }
    if &first[..] != reply::ACK {
        let mut rest = Vec::new();
        let _ = control.read_to_end(&mut rest);
        let mut text = first.to_vec();
        text.extend_from_slice(&rest);
        return Err(anyhow!(ServerReply(String::from_utf8_lossy(&text).into_owned())));
    }
    Ok(Exchange { control, listener })
}

// Once control hits EOF the server has given up on the data leg; a
// connection already in the backlog still gets this long to be picked up.
const CLOSED_CONTROL_GRACE: Duration = Duration::from_millis(200);

fn accept_with_timeout(ex: &Exchange, timeout: Duration) -> Result<TcpStream> {
    ex.listener.set_nonblocking(true)?;
    ex.control.set_nonblocking(true)?;
    let res = poll_accept(ex, timeout);
    ex.control.set_nonblocking(false)?;
    res
}

fn poll_accept(ex: &Exchange, timeout: Duration) -> Result<TcpStream> {
    let mut deadline = Instant::now() + timeout;
    let mut control_closed = false;
    loop {
        match ex.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if !control_closed && control_at_eof(&ex.control)? {
                    control_closed = true;
                    deadline = deadline.min(Instant::now() + CLOSED_CONTROL_GRACE);
                }
                if Instant::now() >= deadline {
                    if control_closed {
                        bail!("server closed the control connection without opening the data connection");
                    }
                    bail!("server did not open the data connection within {:?}", timeout);
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(e).context("accept data connection"),
        }
    }
}

fn control_at_eof(control: &TcpStream) -> Result<bool> {
    let mut byte = [0u8; 1];
    match control.peek(&mut byte) {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e).context("watch control connection"),
    }
}

// Anything the server wrote on control after the acknowledgment is an error
fn read_trailer(control: &mut TcpStream) -> Result<()> {
    let mut trailer = Vec::new();
    control
        .read_to_end(&mut trailer)
        .context("read control status")?;
    if !trailer.is_empty() {
        return Err(anyhow!(ServerReply(String::from_utf8_lossy(&trailer).into_owned())));
    }
    Ok(())
}

/// Fetch the server's directory listing.
pub fn request_listing(req: &ClientRequest) -> Result<Vec<String>> {
    let mut ex = start(req)?;
    let mut data = accept_with_timeout(&ex, DATA_ACCEPT_TIMEOUT)?;
    let mut payload = Vec::new();
    data.read_to_end(&mut payload).context("read listing")?;
    read_trailer(&mut ex.control)?;

    // Older servers pad the listing with NULs and a trailing space
    let text = String::from_utf8_lossy(&payload);
    Ok(text
        .trim_end_matches('\0')
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// Fetch a file into `out`, returning the number of bytes received.
///
/// The data connection is drained first; the server reports a missing or
/// unreadable file on the control connection, which is read once the data
/// side closes.
pub fn request_file<W: Write>(req: &ClientRequest, out: &mut W) -> Result<u64> {
    let mut ex = start(req)?;
    let mut data = accept_with_timeout(&ex, DATA_ACCEPT_TIMEOUT)?;
    let received = io::copy(&mut data, out).context("receive file")?;
    read_trailer(&mut ex.control)?;
    out.flush()?;
    Ok(received)
}
