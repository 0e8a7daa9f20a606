//! Control message parsing and verb validation

use std::io::{self, Write};

use crate::protocol::{reply, verb, MAX_FIELD_LEN};

/// Command verb after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    List,
    Get,
}

impl Verb {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            verb::LIST => Some(Verb::List),
            verb::GET => Some(Verb::Get),
            _ => None,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Verb::List => verb::LIST,
            Verb::Get => verb::GET,
        }
    }
}

/// The three fields of a control message, verb still unchecked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCommand {
    pub data_port: String,
    pub verb: String,
    pub filename: String,
}

impl RawCommand {
    pub fn verb(&self) -> Option<Verb> {
        Verb::from_token(&self.verb)
    }
}

/// A validated command, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub data_port: String,
    pub verb: Verb,
    /// Empty unless `verb` is `Get`.
    pub filename: String,
}

/// Split a control line into data port, verb and filename.
///
/// Fields are separated by single spaces; two spaces in a row yield an empty
/// field. Parsing stops once a fourth field would begin, and a NUL ends the
/// message. Each field keeps at most `MAX_FIELD_LEN` bytes, the rest of the
/// field is dropped. No trimming and no port validation happen here.
pub fn parse_command(line: &str) -> RawCommand {
    let mut cmd = RawCommand::default();
    let mut field = 0usize;

    for ch in line.chars() {
        if ch == '\0' {
            break;
        }
        if ch == ' ' {
            field += 1;
            if field == 3 {
                break;
            }
            continue;
        }
        let slot = match field {
            0 => &mut cmd.data_port,
            1 => &mut cmd.verb,
            _ => &mut cmd.filename,
        };
        if slot.len() + ch.len_utf8() <= MAX_FIELD_LEN {
            slot.push(ch);
        }
    }

    cmd
}

/// Accept or reject a parsed command, answering on the control connection.
///
/// Writes the acknowledgment and returns the typed command when the verb is
/// known; otherwise writes the incorrect-command error and returns `None`, in
/// which case the caller must not open a data connection.
pub fn check_command<W: Write>(raw: RawCommand, control: &mut W) -> io::Result<Option<Command>> {
    match raw.verb() {
        Some(verb) => {
            control.write_all(reply::ACK)?;
            control.flush()?;
            let filename = match verb {
                Verb::Get => raw.filename,
                Verb::List => String::new(),
            };
            Ok(Some(Command {
                data_port: raw.data_port,
                verb,
                filename,
            }))
        }
        None => {
            control.write_all(reply::INCORRECT_COMMAND)?;
            control.flush()?;
            Ok(None)
        }
    }
}
