use std::io::{Read, Write};

use commands::ZaberCommand;
use utilities::command_executor::{DeviceHandler, ExecutorError};
use zaber::{Target, TransportFault, Zaber, command::movement::Move};

use crate::bridge::axis::{AxisError, TransportKind};

pub mod command_sender;
pub mod commands;

impl From<zaber::Error> for AxisError {
    fn from(error: zaber::Error) -> Self {
        match error.transport_fault() {
            Some(fault) => {
                let kind = match fault {
                    TransportFault::Timeout => TransportKind::Timeout,
                    TransportFault::ConnectionClosed => TransportKind::ConnectionClosed,
                    TransportFault::ConnectionFailed => TransportKind::ConnectionFailed,
                };
                AxisError::transport(kind, error.to_string())
            }
            None => AxisError::Command(error.to_string()),
        }
    }
}

impl From<ExecutorError> for AxisError {
    fn from(error: ExecutorError) -> Self {
        AxisError::transport(TransportKind::ConnectionClosed, error.to_string())
    }
}

/// The byte line a chain of devices hangs off, normally a
/// [`utilities::lazy_serial::LazySerialPort`].
pub trait SerialLine: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLine for T {}

/// Every device on one serial chain, driven from the executor thread.
pub struct ZaberHandler {
    port: Box<dyn SerialLine>,
    zaber: Zaber,
}

impl DeviceHandler for ZaberHandler {
    type Command = ZaberCommand;
}

impl ZaberHandler {
    pub fn new(zaber: Zaber, port: impl SerialLine + 'static) -> Self {
        Self {
            port: Box::new(port),
            zaber,
        }
    }

    pub fn detect(&mut self) -> zaber::Result<Vec<u8>> {
        self.zaber.detect(&mut self.port)
    }

    /// Homing can take longer than a serial timeout, so only the start is
    /// sent here and the caller polls for idle.
    pub fn start_home(&mut self, device: u8) -> zaber::Result<()> {
        self.zaber.start_home(&mut self.port, device)
    }

    pub fn is_busy(&mut self, device: u8, target: Target) -> zaber::Result<bool> {
        self.zaber.is_busy(&mut self.port, device, target)
    }

    pub fn get_position(&mut self, device: u8, target: Target) -> zaber::Result<i64> {
        self.zaber.get_position(&mut self.port, device, target)
    }

    pub fn get_setting(&mut self, device: u8, axis: u8, name: &str) -> zaber::Result<String> {
        self.zaber.get_setting(&mut self.port, device, axis, name)
    }

    pub fn stop(&mut self, device: u8, target: Target) -> zaber::Result<()> {
        self.zaber.stop(&mut self.port, device, target)
    }

    pub fn start_move(&mut self, device: u8, target: Target, movement: Move) -> zaber::Result<()> {
        self.zaber
            .start_move(&mut self.port, device, target, movement)
    }

    pub fn lockstep_info(&mut self, device: u8, id: u8) -> zaber::Result<Option<[u8; 2]>> {
        self.zaber.lockstep_info(&mut self.port, device, id)
    }

    pub fn lockstep_enable(&mut self, device: u8, id: u8, axes: [u8; 2]) -> zaber::Result<()> {
        self.zaber
            .lockstep_enable(&mut self.port, device, id, axes)
    }

    pub fn lockstep_disable(&mut self, device: u8, id: u8) -> zaber::Result<()> {
        self.zaber.lockstep_disable(&mut self.port, device, id)
    }
}
