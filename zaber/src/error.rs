use std::{
    io::{self, ErrorKind},
    time::Duration,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Device did not respond in time")]
    Timeout,

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(io::Error),

    #[error("Command rejected: {reason}")]
    Rejected { reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No devices detected")]
    NoDevices,

    #[error("Device {index} not found, {found} detected")]
    DeviceNotFound { index: usize, found: usize },

    #[error("Device {device} still busy after {waited:?}")]
    StillBusy { device: u8, waited: Duration },
}

/// The fault classes after which the link has to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    Timeout,
    ConnectionClosed,
    ConnectionFailed,
}

impl Error {
    pub fn transport_fault(&self) -> Option<TransportFault> {
        match self {
            Error::Timeout => Some(TransportFault::Timeout),
            Error::ConnectionClosed(_) => Some(TransportFault::ConnectionClosed),
            Error::ConnectionFailed(_) => Some(TransportFault::ConnectionFailed),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.transport_fault().is_some()
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Error::Timeout,
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::UnexpectedEof => Error::ConnectionClosed(error.to_string()),
            ErrorKind::NotConnected
            | ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::ConnectionRefused => Error::ConnectionFailed(error.to_string()),
            _ => Error::Io(error),
        }
    }
}
