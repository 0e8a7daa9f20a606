//! ftserve library
//!
//! A single-client file access service: commands arrive on a control
//! connection, payloads leave on a separate data connection that the server
//! opens back to the client.

pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod data_channel;
pub mod error;
pub mod fs_enum;
pub mod log;
pub mod logger;
pub mod protocol;
pub mod session;
pub mod transfer;

pub use command::{Command, RawCommand, Verb};
pub use error::SessionError;
pub use session::{Server, SessionOutcome, SessionReport};
