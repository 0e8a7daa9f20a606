//! Outbound data connection (server connects, client listens).
//!
//! The control leg is accepted by the server; for the data leg the roles
//! invert and the server dials the port the client advertised in its
//! request. One channel carries exactly one transfer and is closed when it
//! is dropped or passed to [`DataChannel::close`].

use std::io::{self, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::config::Timeouts;
use crate::error::SessionError;
use crate::protocol::timeouts::{CONNECT_ATTEMPTS, CONNECT_RETRY_MS};

/// Names the client behind a control connection.
///
/// `resolve_client_hostname` is for display only. The data connection goes
/// to `data_host`, which defaults to the peer's IP so it always routes back
/// to the same machine.
pub trait HostResolver {
    fn resolve_client_hostname(&self, addr: IpAddr) -> String;

    fn data_host(&self, addr: IpAddr) -> String {
        addr.to_string()
    }
}

/// Uses the peer's textual IP; always routes back to the peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddrResolver;

impl HostResolver for PeerAddrResolver {
    fn resolve_client_hostname(&self, addr: IpAddr) -> String {
        addr.to_string()
    }
}

/// Reverse DNS for the connection log, falling back to the IP text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseDnsResolver;

impl HostResolver for ReverseDnsResolver {
    fn resolve_client_hostname(&self, addr: IpAddr) -> String {
        dns_lookup::lookup_addr(&addr).unwrap_or_else(|_| addr.to_string())
    }
}

/// Parse the data port field of a command.
pub fn parse_data_port(port: &str) -> Result<u16, SessionError> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(SessionError::InvalidPort(port.to_string())),
    }
}

/// An open data connection owned by a single session iteration.
#[derive(Debug)]
pub struct DataChannel {
    stream: TcpStream,
}

impl DataChannel {
    /// Resolve `host`, then connect to it at the advertised `port`.
    pub fn open(host: &str, port: &str, timeouts: &Timeouts) -> Result<Self, SessionError> {
        let port = parse_data_port(port)?;
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| SessionError::Resolve {
                host: host.to_string(),
                port,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(SessionError::Resolve {
                host: host.to_string(),
                port,
            });
        }

        let mut last_err = None;
        for addr in &addrs {
            match connect_with_retry(addr, timeouts.connect) {
                Ok(stream) => return Self::from_stream(stream, timeouts),
                Err(e) => last_err = Some(e),
            }
        }
        Err(SessionError::Connect {
            target: format!("{}:{}", host, port),
            source: last_err
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address")),
        })
    }

    fn from_stream(stream: TcpStream, timeouts: &Timeouts) -> Result<Self, SessionError> {
        stream.set_write_timeout(timeouts.io)?;
        stream.set_read_timeout(timeouts.io)?;
        let _ = stream.set_nodelay(true);
        Ok(Self { stream })
    }

    /// Close the channel, signaling end-of-transfer to the client.
    pub fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Write for DataChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

// Retry only while the client's listener is not up yet
fn connect_with_retry(addr: &SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(s) => return Ok(s),
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused && attempt < CONNECT_ATTEMPTS => {
                thread::sleep(Duration::from_millis(CONNECT_RETRY_MS));
            }
            Err(e) => return Err(e),
        }
    }
}
