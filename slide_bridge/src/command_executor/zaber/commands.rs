use utilities::command_executor::Command;
use zaber::{Target, command::movement::Move};

use crate::{bridge::axis::AxisError, command_executor::zaber::ZaberHandler};

#[derive(Debug, Clone)]
pub enum ZaberCommand {
    Detect,
    StartHome { device: u8 },
    IsBusy { device: u8, target: Target },
    GetPosition { device: u8, target: Target },
    GetSetting { device: u8, axis: u8, name: String },
    Stop { device: u8, target: Target },
    Move { device: u8, target: Target, movement: Move },
    LockstepInfo { device: u8, id: u8 },
    LockstepEnable { device: u8, id: u8, axes: [u8; 2] },
    LockstepDisable { device: u8, id: u8 },
}

#[derive(Debug)]
pub enum ZaberResponse {
    Ok,
    Devices(Vec<u8>),
    Busy(bool),
    Position(i64),
    Setting(String),
    Lockstep(Option<[u8; 2]>),
}

impl Command for ZaberCommand {
    type Response = ZaberResponse;
    type Error = AxisError;
    type Handler = ZaberHandler;

    fn execute(self, handler: &mut Self::Handler) -> Result<Self::Response, Self::Error> {
        let response = match self {
            ZaberCommand::Detect => ZaberResponse::Devices(handler.detect()?),
            ZaberCommand::StartHome { device } => {
                handler.start_home(device)?;
                ZaberResponse::Ok
            }
            ZaberCommand::IsBusy { device, target } => {
                ZaberResponse::Busy(handler.is_busy(device, target)?)
            }
            ZaberCommand::GetPosition { device, target } => {
                ZaberResponse::Position(handler.get_position(device, target)?)
            }
            ZaberCommand::GetSetting { device, axis, name } => {
                ZaberResponse::Setting(handler.get_setting(device, axis, &name)?)
            }
            ZaberCommand::Stop { device, target } => {
                handler.stop(device, target)?;
                ZaberResponse::Ok
            }
            ZaberCommand::Move {
                device,
                target,
                movement,
            } => {
                handler.start_move(device, target, movement)?;
                ZaberResponse::Ok
            }
            ZaberCommand::LockstepInfo { device, id } => {
                ZaberResponse::Lockstep(handler.lockstep_info(device, id)?)
            }
            ZaberCommand::LockstepEnable { device, id, axes } => {
                handler.lockstep_enable(device, id, axes)?;
                ZaberResponse::Ok
            }
            ZaberCommand::LockstepDisable { device, id } => {
                handler.lockstep_disable(device, id)?;
                ZaberResponse::Ok
            }
        };
        Ok(response)
    }
}
