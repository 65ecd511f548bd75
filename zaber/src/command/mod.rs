pub mod lockstep;
pub mod movement;

use std::{
    fmt,
    io::{Read, Write},
};

use tracing::{debug, trace};

use crate::{
    ALL_DEVICES,
    error::{Error, Result},
    reply::{Message, Reply},
};

const MAX_LINE_LENGTH: usize = 256;
const MAX_SKIPPED_LINES: usize = 16;

/// One addressed line of the ASCII protocol. A device echoes `id` in its
/// reply, e.g. `/1 1 07 get pos` is answered by `@01 1 07 OK IDLE -- 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub device: u8,
    pub axis: u8,
    pub id: Option<u8>,
    pub payload: String,
}

impl Request {
    pub fn with_id(self, id: u8) -> Self {
        Request {
            id: Some(id),
            ..self
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{} {}", self.device, self.axis)?;
        if let Some(id) = self.id {
            write!(f, " {:02}", id)?;
        }
        if !self.payload.is_empty() {
            write!(f, " {}", self.payload)?;
        }
        writeln!(f)
    }
}

pub trait AsciiCommand {
    /// Text after the address, e.g. `move abs 1000`.
    fn payload(&self) -> String;

    fn request(&self, device: u8, axis: u8) -> Request {
        Request {
            device,
            axis,
            id: None,
            payload: self.payload(),
        }
    }
}

pub fn write_request(sender: &mut (impl Write + Read), request: &Request) -> Result<()> {
    let line = request.to_string();
    trace!("-> {}", line.trim_end());

    sender.write_all(line.as_bytes())?;
    sender.flush()?;
    Ok(())
}

/// Reads one line, without the `\r\n` terminator.
pub fn read_line(sender: &mut (impl Write + Read)) -> Result<String> {
    let mut line = Vec::with_capacity(32);
    let mut byte = [0u8; 1];

    loop {
        sender.read_exact(&mut byte)?;
        match byte[0] {
            b'\n' => break,
            b'\r' => {}
            b => {
                if line.len() == MAX_LINE_LENGTH {
                    return Err(Error::Protocol("Reply line too long".to_string()));
                }
                line.push(b);
            }
        }
    }

    let line = String::from_utf8(line)
        .map_err(|_| Error::Protocol("Reply is not valid ASCII".to_string()))?;
    trace!("<- {}", line);
    Ok(line)
}

/// Whether `reply` answers `request`. A broadcast is answered by every
/// device, so only the id is compared for it.
pub fn answers(request: &Request, reply: &Reply) -> bool {
    let addressed = request.device == ALL_DEVICES
        || (reply.device == request.device && reply.axis == request.axis);
    addressed && reply.id == request.id
}

/// Writes `request` and returns its reply. Alerts, info lines and replies to
/// other requests, including late ones to a request that already timed out,
/// are skipped.
pub fn send_raw(sender: &mut (impl Write + Read), request: &Request) -> Result<Reply> {
    write_request(sender, request)?;

    for _ in 0..MAX_SKIPPED_LINES {
        let line = read_line(sender)?;
        if line.is_empty() {
            continue;
        }

        match Message::parse(&line)? {
            Message::Reply(reply) if answers(request, &reply) => return Ok(reply),
            Message::Reply(reply) => {
                debug!(
                    "Skipping reply from device {} axis {} id {:?} while waiting for {}",
                    reply.device,
                    reply.axis,
                    reply.id,
                    request.to_string().trim_end()
                );
            }
            Message::Alert(_) | Message::Info(_) => {}
        }
    }

    Err(Error::Protocol(format!(
        "No reply to '{}'",
        request.to_string().trim_end()
    )))
}

/// Empty command, answered with the current status.
pub struct Status;

impl AsciiCommand for Status {
    fn payload(&self) -> String {
        String::new()
    }
}

pub struct Stop;

impl AsciiCommand for Stop {
    fn payload(&self) -> String {
        "stop".to_string()
    }
}

pub struct Home;

impl AsciiCommand for Home {
    fn payload(&self) -> String {
        "home".to_string()
    }
}

pub struct Get<'a>(pub &'a str);

impl AsciiCommand for Get<'_> {
    fn payload(&self) -> String {
        format!("get {}", self.0)
    }
}
