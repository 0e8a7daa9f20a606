//! Payload producers for the data connection: directory listing and
//! chunked file send.
//!
//! Error text for the client never goes through here on the data side; the
//! only client-facing message (file not found) is written to the control
//! connection passed in by the caller.

use std::fs::File;
use std::io::{self, Read, Write};

use crate::error::SessionError;
use crate::fs_enum::{contains_entry, DirectoryLister};
use crate::protocol::{reply, CHUNK_SIZE, MAX_LISTING_LEN, READ_INCREMENT};

/// Bounded transmission buffer. Filled from the source, written out whole,
/// then reset.
#[derive(Debug)]
pub struct TransferChunk {
    buf: Vec<u8>,
    cap: usize,
}

impl TransferChunk {
    pub fn new() -> Self {
        Self::with_capacity(CHUNK_SIZE)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether `n` more bytes fit without exceeding the cap
    pub fn fits(&self, n: usize) -> bool {
        self.buf.len() + n <= self.cap
    }

    /// Append bytes; callers check `fits` first and flush when it fails.
    pub fn append(&mut self, bytes: &[u8]) {
        debug_assert!(self.fits(bytes.len()));
        self.buf.extend_from_slice(bytes);
    }

    /// Write the pending bytes as one write and reset. Empty chunks write
    /// nothing.
    pub fn flush_to<W: Write>(&mut self, out: &mut W) -> io::Result<usize> {
        if self.buf.is_empty() {
            return Ok(0);
        }
        out.write_all(&self.buf)?;
        let n = self.buf.len();
        self.buf.clear();
        Ok(n)
    }
}

impl Default for TransferChunk {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub payload: Vec<u8>,
    pub included: usize,
    pub dropped: usize,
}

/// Join entry names with single spaces, keeping the result within
/// `MAX_LISTING_LEN`. The first entry that does not fit ends the listing;
/// it and every later entry are dropped.
pub fn build_listing(entries: &[String]) -> Listing {
    let mut payload = Vec::with_capacity(MAX_LISTING_LEN);
    let mut included = 0;
    for name in entries {
        let sep = usize::from(included > 0);
        if payload.len() + sep + name.len() > MAX_LISTING_LEN {
            break;
        }
        if sep == 1 {
            payload.push(b' ');
        }
        payload.extend_from_slice(name.as_bytes());
        included += 1;
    }
    Listing {
        payload,
        included,
        dropped: entries.len() - included,
    }
}

/// List the served directory and write it to the data connection in a
/// single write.
pub fn send_listing<W: Write>(
    lister: &dyn DirectoryLister,
    data: &mut W,
) -> Result<Listing, SessionError> {
    let entries = lister.list_entries().map_err(|source| SessionError::Unreadable {
        name: lister.root().display().to_string(),
        source,
    })?;
    let listing = build_listing(&entries);
    if !listing.payload.is_empty() {
        data.write_all(&listing.payload)?;
        data.flush()?;
    }
    Ok(listing)
}

/// Copy `src` to `out` through a `TransferChunk`.
///
/// Reads come in increments of at most `READ_INCREMENT` bytes. The chunk is
/// flushed whenever the next increment would overflow it, and once more at
/// end of input, so every write is at most `CHUNK_SIZE` bytes. Read failures
/// map to `Unreadable`, write failures to `Io`.
pub fn stream_chunks<R: Read, W: Write>(
    name: &str,
    src: &mut R,
    out: &mut W,
) -> Result<u64, SessionError> {
    let mut chunk = TransferChunk::new();
    let mut increment = [0u8; READ_INCREMENT];
    let mut total = 0u64;

    loop {
        let n = match src.read(&mut increment) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(SessionError::Unreadable {
                    name: name.to_string(),
                    source,
                })
            }
        };
        if !chunk.fits(n) {
            total += chunk.flush_to(out)? as u64;
        }
        chunk.append(&increment[..n]);
    }
    total += chunk.flush_to(out)? as u64;
    out.flush()?;
    Ok(total)
}

/// Serve a Get: confirm `name` is one of the listed entries, then stream
/// the file over `data`.
///
/// A name that is not listed gets `ERROR File not found` on `control` and
/// nothing on `data`.
pub fn send_requested_file<D: Write, C: Write>(
    name: &str,
    lister: &dyn DirectoryLister,
    data: &mut D,
    control: &mut C,
) -> Result<u64, SessionError> {
    let present = contains_entry(lister, name).map_err(|source| SessionError::Unreadable {
        name: lister.root().display().to_string(),
        source,
    })?;
    if !present {
        control.write_all(reply::FILE_NOT_FOUND)?;
        control.flush()?;
        return Err(SessionError::FileNotFound(name.to_string()));
    }

    let path = lister.root().join(name);
    let mut file = File::open(&path).map_err(|source| SessionError::Unreadable {
        name: name.to_string(),
        source,
    })?;
    stream_chunks(name, &mut file, data)
}
