use utilities::command_executor::CommandSender;
use zaber::{Target, command::movement::Move};

use crate::bridge::axis::AxisError;

use super::commands::{ZaberCommand, ZaberResponse};

fn unexpected(response: ZaberResponse) -> AxisError {
    AxisError::Command(format!("Unexpected response type: {:?}", response))
}

/// Async face of the serial chain executor. Clones share the executor.
#[derive(Clone)]
pub struct ZaberCommandSender {
    sender: CommandSender<ZaberCommand>,
}

impl ZaberCommandSender {
    pub fn new(sender: CommandSender<ZaberCommand>) -> Self {
        Self { sender }
    }

    async fn expect_ok(&self, command: ZaberCommand) -> Result<(), AxisError> {
        match self.sender.send_command(command).await? {
            ZaberResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn detect(&self) -> Result<Vec<u8>, AxisError> {
        match self.sender.send_command(ZaberCommand::Detect).await? {
            ZaberResponse::Devices(devices) => Ok(devices),
            other => Err(unexpected(other)),
        }
    }

    pub async fn start_home(&self, device: u8) -> Result<(), AxisError> {
        self.expect_ok(ZaberCommand::StartHome { device }).await
    }

    pub async fn is_busy(&self, device: u8, target: Target) -> Result<bool, AxisError> {
        match self
            .sender
            .send_command(ZaberCommand::IsBusy { device, target })
            .await?
        {
            ZaberResponse::Busy(busy) => Ok(busy),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_position(&self, device: u8, target: Target) -> Result<i64, AxisError> {
        match self
            .sender
            .send_command(ZaberCommand::GetPosition { device, target })
            .await?
        {
            ZaberResponse::Position(position) => Ok(position),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_setting(&self, device: u8, axis: u8, name: &str) -> Result<String, AxisError> {
        let command = ZaberCommand::GetSetting {
            device,
            axis,
            name: name.to_string(),
        };
        match self.sender.send_command(command).await? {
            ZaberResponse::Setting(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn stop(&self, device: u8, target: Target) -> Result<(), AxisError> {
        self.expect_ok(ZaberCommand::Stop { device, target }).await
    }

    pub async fn start_move(
        &self,
        device: u8,
        target: Target,
        movement: Move,
    ) -> Result<(), AxisError> {
        self.expect_ok(ZaberCommand::Move {
            device,
            target,
            movement,
        })
        .await
    }

    pub async fn lockstep_info(&self, device: u8, id: u8) -> Result<Option<[u8; 2]>, AxisError> {
        match self
            .sender
            .send_command(ZaberCommand::LockstepInfo { device, id })
            .await?
        {
            ZaberResponse::Lockstep(axes) => Ok(axes),
            other => Err(unexpected(other)),
        }
    }

    pub async fn lockstep_enable(
        &self,
        device: u8,
        id: u8,
        axes: [u8; 2],
    ) -> Result<(), AxisError> {
        self.expect_ok(ZaberCommand::LockstepEnable { device, id, axes })
            .await
    }

    pub async fn lockstep_disable(&self, device: u8, id: u8) -> Result<(), AxisError> {
        self.expect_ok(ZaberCommand::LockstepDisable { device, id })
            .await
    }
}
