use super::{AsciiCommand, movement::Move};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockstepAction {
    Info,
    Enable([u8; 2]),
    Disable,
    Move(Move),
    Stop,
}

/// Commands for a lockstep group. They are always sent to axis 0 of the
/// device that owns the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lockstep {
    pub id: u8,
    pub action: LockstepAction,
}

impl Lockstep {
    pub fn new(id: u8, action: LockstepAction) -> Self {
        Self { id, action }
    }
}

impl AsciiCommand for Lockstep {
    fn payload(&self) -> String {
        match &self.action {
            LockstepAction::Info => format!("lockstep {} info", self.id),
            LockstepAction::Enable([first, second]) => {
                format!("lockstep {} setup enable {} {}", self.id, first, second)
            }
            LockstepAction::Disable => format!("lockstep {} setup disable", self.id),
            LockstepAction::Move(movement) => {
                format!("lockstep {} {}", self.id, movement.payload())
            }
            LockstepAction::Stop => format!("lockstep {} stop", self.id),
        }
    }
}

/// Parses `lockstep <id> info` data: `disabled`, or the two axes followed by
/// offset and twist.
pub fn parse_info(data: &str) -> Result<Option<[u8; 2]>> {
    if data.trim() == "disabled" {
        return Ok(None);
    }

    let axes: Vec<u8> = data
        .split_whitespace()
        .take(2)
        .map(|field| field.parse::<u8>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Protocol(format!("Invalid lockstep info '{}'", data)))?;

    match axes.as_slice() {
        [first, second] => Ok(Some([*first, *second])),
        _ => Err(Error::Protocol(format!("Invalid lockstep info '{}'", data))),
    }
}
