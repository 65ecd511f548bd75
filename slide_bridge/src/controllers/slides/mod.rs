use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, instrument};
use utilities::{command_executor::CommandExecutor, lazy_serial::LazySerialPort};
use zaber::{Target, Zaber, units::Resolution};

use crate::{
    bridge::{
        BridgeNode,
        axis::{AxisError, AxisFactory, AxisHandle},
    },
    command_executor::zaber::{ZaberHandler, command_sender::ZaberCommandSender},
    config::{BridgeConfig, ConfigError, SlideAxis, SlideConfig},
    controllers::slides::axis::ZaberSlide,
    model::{AddressSpace, NamespaceIndex},
};

pub mod axis;

const HOME_POLL: Duration = Duration::from_millis(100);

/// Builds a [`ZaberSlide`] from scratch: detection, homing and, for lockstep
/// slides, a fresh lockstep setup.
pub struct SlideFactory {
    name: String,
    sender: ZaberCommandSender,
    device_index: usize,
    axis: SlideAxis,
    resolution: Resolution,
    home_timeout: Duration,
}

impl SlideFactory {
    pub fn new(config: &SlideConfig, sender: ZaberCommandSender, home_timeout: Duration) -> Self {
        Self {
            name: config.name.clone(),
            sender,
            device_index: config.device_index,
            axis: config.axis,
            resolution: Resolution::new(config.microstep_size),
            home_timeout,
        }
    }

    /// Polls from here rather than on the executor thread, so the other
    /// slides on the chain keep being served while this one homes.
    async fn home(&self, device: u8) -> Result<(), AxisError> {
        self.sender.start_home(device).await?;

        let started = Instant::now();
        while self.sender.is_busy(device, Target::Axis(0)).await? {
            let waited = started.elapsed();
            if waited >= self.home_timeout {
                return Err(AxisError::Init(
                    zaber::Error::StillBusy { device, waited }.to_string(),
                ));
            }
            tokio::time::sleep(HOME_POLL).await;
        }

        info!("{}: device {} homed in {:?}", self.name, device, started.elapsed());
        Ok(())
    }

    async fn connect(&self) -> Result<ZaberSlide, AxisError> {
        let devices = self.sender.detect().await?;
        let device = devices.get(self.device_index).copied().ok_or_else(|| {
            AxisError::Init(
                zaber::Error::DeviceNotFound {
                    index: self.device_index,
                    found: devices.len(),
                }
                .to_string(),
            )
        })?;

        let target = match self.axis {
            SlideAxis::Lockstep { id, axes } => {
                if let Some(locked) = self.sender.lockstep_info(device, id).await? {
                    info!(
                        "{}: releasing lockstep {} on axes {:?} before homing",
                        self.name, id, locked
                    );
                    self.sender.lockstep_disable(device, id).await?;
                }
                self.home(device).await?;
                self.sender.lockstep_enable(device, id, axes).await?;

                Target::Lockstep {
                    id,
                    primary_axis: axes[0],
                }
            }
            SlideAxis::Single { axis } => {
                self.home(device).await?;
                Target::Axis(axis)
            }
        };

        Ok(ZaberSlide::new(
            self.name.clone(),
            self.sender.clone(),
            device,
            target,
            self.resolution,
        ))
    }
}

#[async_trait]
impl AxisFactory for SlideFactory {
    #[instrument(skip(self), fields(slide = %self.name))]
    async fn init(&self) -> Result<AxisHandle, AxisError> {
        let slide = self.connect().await.map_err(|e| match e {
            AxisError::Init(_) => e,
            other => AxisError::Init(other.to_string()),
        })?;

        Ok(Box::new(slide))
    }
}

/// One executor per serial port. Every slide on the chain shares it.
pub fn create_executor(
    config: &BridgeConfig,
) -> Result<(CommandExecutor<ZaberHandler>, ZaberCommandSender), ConfigError> {
    let timeout = config.serial_timeout()?;
    let port = LazySerialPort::new(&config.serial.port, config.serial.baud_rate, timeout, timeout);

    let handler = ZaberHandler::new(Zaber::new(), port);
    let executor = CommandExecutor::new("zaber-serial", handler);
    let sender = ZaberCommandSender::new(executor.sender());

    Ok((executor, sender))
}

pub fn create_slides(
    config: &BridgeConfig,
    sender: &ZaberCommandSender,
    space: &mut dyn AddressSpace,
    ns: NamespaceIndex,
) -> anyhow::Result<Vec<BridgeNode>> {
    let cooldown = config.reconnect_cooldown()?;
    let home_timeout = config.home_timeout()?;

    config
        .slides
        .iter()
        .enumerate()
        .map(|(index, slide)| {
            let factory = Arc::new(SlideFactory::new(slide, sender.clone(), home_timeout));
            BridgeNode::new(space, ns, index, &slide.name, factory, cooldown)
                .with_context(|| format!("Failed to register slide '{}'", slide.name))
        })
        .collect()
}
