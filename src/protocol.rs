//! Shared protocol constants for the control/data wire format

// Control message payload cap (one bounded read per request)
pub const MAX_CONTROL_MESSAGE: usize = 255;

// Each parsed field (data port, verb, filename) keeps at most this many bytes
pub const MAX_FIELD_LEN: usize = 31;

// Transmission buffer for file payloads; every data write is at most this long
pub const CHUNK_SIZE: usize = 1024;

// Largest single read from a file before it is appended to the chunk
pub const READ_INCREMENT: usize = 256;

// Directory listing payload cap
pub const MAX_LISTING_LEN: usize = CHUNK_SIZE - 1;

// Verbs as they appear on the wire
pub mod verb {
    pub const LIST: &str = "-l";
    pub const GET: &str = "-g";
}

// Replies sent over the control connection. Never framed or terminated;
// the client tells them apart by the first byte.
pub mod reply {
    pub const ACK: &[u8] = b"0";
    pub const INCORRECT_COMMAND: &[u8] = b"ERROR Incorrect Command";
    pub const FILE_NOT_FOUND: &[u8] = b"ERROR File not found";
    pub const FILE_UNREADABLE: &[u8] = b"ERROR File could not be read";
}

// Centralized timeout defaults
pub mod timeouts {
    // Per-attempt data connection timeout (ms)
    pub const CONNECT_MS: u64 = 5_000;

    // Read/write timeout on control and data sockets (ms)
    pub const IO_MS: u64 = 30_000;

    // A refused data connect is retried this many times; clients may open
    // their data listener only after reading the acknowledgment.
    pub const CONNECT_ATTEMPTS: u32 = 10;

    // Pause between refused connect attempts (ms)
    pub const CONNECT_RETRY_MS: u64 = 50;
}
