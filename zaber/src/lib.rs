//! Zaber ASCII protocol over any blocking `Read + Write` line.

use std::io::{Read, Write};

use command::{
    AsciiCommand, Get, Home, Request, Status, Stop,
    lockstep::{self, Lockstep, LockstepAction},
    movement::Move,
};
use tracing::{debug, info};

use crate::reply::Reply;

pub mod command;
pub mod error;
pub mod reply;
pub mod units;

pub use error::{Error, Result, TransportFault};

/// The broadcast address, answered by every device on the chain.
pub const ALL_DEVICES: u8 = 0;

/// Message ids run from 1 to this value and then wrap.
const LAST_MESSAGE_ID: u8 = 99;

/// What a command is aimed at on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Axis(u8),
    /// A lockstep group. Position is read from `primary_axis`.
    Lockstep { id: u8, primary_axis: u8 },
}

impl Target {
    pub fn position_axis(&self) -> u8 {
        match self {
            Target::Axis(axis) => *axis,
            Target::Lockstep { primary_axis, .. } => *primary_axis,
        }
    }
}

/// Driver for every device on one line. Each request carries a fresh
/// message id so that a reply arriving after its request timed out is never
/// taken for the answer to a later one.
#[derive(Default, Clone)]
pub struct Zaber {
    last_id: u8,
}

impl Zaber {
    pub fn new() -> Self {
        Zaber::default()
    }

    fn tag(&mut self, request: Request) -> Request {
        self.last_id = self.last_id % LAST_MESSAGE_ID + 1;
        request.with_id(self.last_id)
    }

    fn send(&mut self, sender: &mut (impl Write + Read), request: Request) -> Result<Reply> {
        let request = self.tag(request);
        command::send_raw(sender, &request)?.ok()
    }

    /// Returns the addresses of every device that answers a broadcast, in
    /// ascending order. Collection ends at the first read timeout.
    pub fn detect(&mut self, sender: &mut (impl Write + Read)) -> Result<Vec<u8>> {
        let request = self.tag(Get("deviceid").request(ALL_DEVICES, 0));
        command::write_request(sender, &request)?;

        let mut devices = Vec::new();
        loop {
            let line = match command::read_line(sender) {
                Ok(line) => line,
                Err(Error::Timeout) => break,
                Err(e) => return Err(e),
            };

            if let Ok(reply::Message::Reply(reply)) = reply::Message::parse(&line) {
                if command::answers(&request, &reply) && !reply.rejected {
                    devices.push(reply.device);
                }
            }
        }

        devices.sort_unstable();
        devices.dedup();

        if devices.is_empty() {
            return Err(Error::NoDevices);
        }

        info!("Detected {} device(s): {:?}", devices.len(), devices);
        Ok(devices)
    }

    pub fn status(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        axis: u8,
    ) -> Result<Reply> {
        self.send(sender, Status.request(device, axis))
    }

    /// Lockstep groups report the device-wide status, which is busy while
    /// any of the locked axes moves.
    pub fn is_busy(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        target: Target,
    ) -> Result<bool> {
        let axis = match target {
            Target::Axis(axis) => axis,
            Target::Lockstep { .. } => 0,
        };
        Ok(self.status(sender, device, axis)?.busy)
    }

    pub fn get_setting(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        axis: u8,
        name: &str,
    ) -> Result<String> {
        Ok(self.send(sender, Get(name).request(device, axis))?.data)
    }

    pub fn get_position(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        target: Target,
    ) -> Result<i64> {
        let request = Get("pos").request(device, target.position_axis());
        self.send(sender, request)?.data_as()
    }

    /// Starts homing every axis of `device` without waiting for it.
    pub fn start_home(&mut self, sender: &mut (impl Write + Read), device: u8) -> Result<()> {
        info!("Homing device {}", device);
        self.send(sender, Home.request(device, 0))?;
        Ok(())
    }

    pub fn stop(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        target: Target,
    ) -> Result<()> {
        let request = match target {
            Target::Axis(axis) => Stop.request(device, axis),
            Target::Lockstep { id, .. } => {
                Lockstep::new(id, LockstepAction::Stop).request(device, 0)
            }
        };
        self.send(sender, request)?;
        Ok(())
    }

    /// Starts `movement` and returns once the device accepted it.
    pub fn start_move(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        target: Target,
        movement: Move,
    ) -> Result<()> {
        let request: Request = match target {
            Target::Axis(axis) => movement.request(device, axis),
            Target::Lockstep { id, .. } => {
                Lockstep::new(id, LockstepAction::Move(movement)).request(device, 0)
            }
        };

        debug!("Starting {:?} on device {} {:?}", movement, device, target);
        self.send(sender, request)?;
        Ok(())
    }

    pub fn lockstep_info(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        id: u8,
    ) -> Result<Option<[u8; 2]>> {
        let request = Lockstep::new(id, LockstepAction::Info).request(device, 0);
        let reply = self.send(sender, request)?;
        lockstep::parse_info(&reply.data)
    }

    pub fn lockstep_enable(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        id: u8,
        axes: [u8; 2],
    ) -> Result<()> {
        let request = Lockstep::new(id, LockstepAction::Enable(axes)).request(device, 0);
        self.send(sender, request)?;
        info!(
            "Lockstep {} enabled on device {} axes {} and {}",
            id, device, axes[0], axes[1]
        );
        Ok(())
    }

    pub fn lockstep_disable(
        &mut self,
        sender: &mut (impl Write + Read),
        device: u8,
        id: u8,
    ) -> Result<()> {
        let request = Lockstep::new(id, LockstepAction::Disable).request(device, 0);
        self.send(sender, request)?;
        Ok(())
    }
}
