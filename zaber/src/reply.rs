use std::str::FromStr;

use crate::error::{Error, Result};

/// A `@` reply, e.g. `@01 1 OK BUSY -- 0` or, with a message id,
/// `@01 1 07 OK BUSY -- 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub device: u8,
    pub axis: u8,
    pub id: Option<u8>,
    pub rejected: bool,
    pub busy: bool,
    pub warning: String,
    pub data: String,
}

/// Anything a device can put on the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Reply(Reply),
    /// `!` lines, sent unprompted when alerts are enabled.
    Alert(String),
    /// `#` lines, extra text that follows some replies.
    Info(String),
}

fn parse_number<T: FromStr>(field: Option<&str>, what: &str, line: &str) -> Result<T> {
    field
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("Invalid {} in reply '{}'", what, line)))
}

impl Reply {
    pub fn parse(line: &str) -> Result<Self> {
        let body = line
            .strip_prefix('@')
            .ok_or_else(|| Error::Protocol(format!("Not a reply: '{}'", line)))?;

        // Drop an optional `:XX` checksum suffix.
        let body = match body.rfind(':') {
            Some(pos) if body.len() - pos == 3 => &body[..pos],
            _ => body,
        };

        let mut fields = body.split_whitespace().peekable();
        let device = parse_number(fields.next(), "device address", line)?;
        let axis = parse_number(fields.next(), "axis number", line)?;
        let id = fields.next_if(|f| f.bytes().all(|b| b.is_ascii_digit()));
        let id = id.map(|f| parse_number(Some(f), "message id", line)).transpose()?;

        let rejected = match fields.next() {
            Some("OK") => false,
            Some("RJ") => true,
            _ => return Err(Error::Protocol(format!("Invalid reply flag in '{}'", line))),
        };
        let busy = match fields.next() {
            Some("BUSY") => true,
            Some("IDLE") => false,
            _ => return Err(Error::Protocol(format!("Invalid status in '{}'", line))),
        };
        let warning = fields
            .next()
            .ok_or_else(|| Error::Protocol(format!("Missing warning flag in '{}'", line)))?
            .to_string();
        let data = fields.collect::<Vec<_>>().join(" ");

        Ok(Reply {
            device,
            axis,
            id,
            rejected,
            busy,
            warning,
            data,
        })
    }

    /// Turns an `RJ` reply into [`Error::Rejected`].
    pub fn ok(self) -> Result<Self> {
        if self.rejected {
            Err(Error::Rejected { reason: self.data })
        } else {
            Ok(self)
        }
    }

    pub fn data_as<T: FromStr>(&self) -> Result<T> {
        self.data.trim().parse().map_err(|_| {
            Error::Protocol(format!(
                "Unexpected data '{}' from device {} axis {}",
                self.data, self.device, self.axis
            ))
        })
    }
}

impl Message {
    pub fn parse(line: &str) -> Result<Self> {
        match line.chars().next() {
            Some('@') => Reply::parse(line).map(Message::Reply),
            Some('!') => Ok(Message::Alert(line.to_string())),
            Some('#') => Ok(Message::Info(line.to_string())),
            _ => Err(Error::Protocol(format!("Unknown message '{}'", line))),
        }
    }
}
