use async_trait::async_trait;
use tracing::debug;
use zaber::{
    Target,
    command::movement::{Move, Profile},
    units::Resolution,
};

use crate::{
    bridge::axis::{AxisError, MotionAxis},
    command_executor::zaber::command_sender::ZaberCommandSender,
};

/// Device setting holding the default speed in native units.
const MAX_SPEED_SETTING: &str = "maxspeed";
/// Device setting holding the default acceleration in native units.
const ACCEL_SETTING: &str = "accel";

/// A homed Zaber axis or lockstep group, in millimetres.
pub struct ZaberSlide {
    name: String,
    sender: ZaberCommandSender,
    device: u8,
    target: Target,
    resolution: Resolution,
}

impl ZaberSlide {
    pub fn new(
        name: String,
        sender: ZaberCommandSender,
        device: u8,
        target: Target,
        resolution: Resolution,
    ) -> Self {
        Self {
            name,
            sender,
            device,
            target,
            resolution,
        }
    }

    async fn setting(&self, name: &str) -> Result<i64, AxisError> {
        let raw = self
            .sender
            .get_setting(self.device, self.target.position_axis(), name)
            .await?;
        raw.trim().parse().map_err(|_| {
            AxisError::Command(format!("Unexpected value '{}' for setting {}", raw, name))
        })
    }

    /// Zero means the device default. When only one of the two is zero, the
    /// command still needs both, so the default is read from the device.
    async fn profile(&self, velocity: f64, acceleration: f64) -> Result<Profile, AxisError> {
        if velocity == 0.0 && acceleration == 0.0 {
            return Ok(Profile::Default);
        }

        let speed = if velocity == 0.0 {
            self.setting(MAX_SPEED_SETTING).await?
        } else {
            self.resolution.velocity_to_native(velocity)
        };
        let accel = if acceleration == 0.0 {
            self.setting(ACCEL_SETTING).await?
        } else {
            self.resolution.acceleration_to_native(acceleration)
        };

        Ok(Profile::Custom { speed, accel })
    }

    async fn start(&self, movement: Move) -> Result<(), AxisError> {
        debug!("{}: {:?}", self.name, movement);
        self.sender
            .start_move(self.device, self.target, movement)
            .await
    }
}

#[async_trait]
impl MotionAxis for ZaberSlide {
    async fn is_busy(&self) -> Result<bool, AxisError> {
        self.sender.is_busy(self.device, self.target).await
    }

    async fn get_position(&self) -> Result<f64, AxisError> {
        let native = self.sender.get_position(self.device, self.target).await?;
        Ok(self.resolution.position_from_native(native))
    }

    async fn move_absolute(
        &self,
        position: f64,
        velocity: f64,
        acceleration: f64,
    ) -> Result<(), AxisError> {
        let profile = self.profile(velocity, acceleration).await?;
        self.start(Move::Absolute {
            position: self.resolution.position_to_native(position),
            profile,
        })
        .await
    }

    async fn move_relative(
        &self,
        distance: f64,
        velocity: f64,
        acceleration: f64,
    ) -> Result<(), AxisError> {
        let profile = self.profile(velocity, acceleration).await?;
        self.start(Move::Relative {
            distance: self.resolution.position_to_native(distance),
            profile,
        })
        .await
    }

    async fn move_velocity(&self, velocity: f64, acceleration: f64) -> Result<(), AxisError> {
        let accel = (acceleration != 0.0)
            .then(|| self.resolution.acceleration_to_native(acceleration));
        self.start(Move::Velocity {
            speed: self.resolution.velocity_to_native(velocity),
            accel,
        })
        .await
    }

    async fn move_max(&self, velocity: f64, acceleration: f64) -> Result<(), AxisError> {
        let profile = self.profile(velocity, acceleration).await?;
        self.start(Move::Max { profile }).await
    }

    async fn move_min(&self, velocity: f64, acceleration: f64) -> Result<(), AxisError> {
        let profile = self.profile(velocity, acceleration).await?;
        self.start(Move::Min { profile }).await
    }

    async fn stop(&self) -> Result<(), AxisError> {
        self.sender.stop(self.device, self.target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::slides::testing::SimulatedChain;

    const LOCKSTEP: Target = Target::Lockstep {
        id: 1,
        primary_axis: 1,
    };

    fn slide(chain: &SimulatedChain, target: Target) -> ZaberSlide {
        ZaberSlide::new(
            "Parallel Slide".to_string(),
            chain.sender(),
            1,
            target,
            Resolution::new(0.0001),
        )
    }

    #[tokio::test]
    async fn position_is_converted_to_millimetres() {
        let chain = SimulatedChain::start(|line| match line {
            "/1 1 get pos" => vec!["@01 1 OK IDLE -- 100000"],
            "/1 0" => vec!["@01 0 OK BUSY -- 0"],
            _ => vec![],
        });
        let slide = slide(&chain, LOCKSTEP);

        assert!(slide.is_busy().await.unwrap());
        assert!((slide.get_position().await.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(chain.written(), vec!["/1 0", "/1 1 get pos"]);
    }

    #[tokio::test]
    async fn default_profile_sends_bare_move() {
        let chain = SimulatedChain::start(|_| vec!["@01 0 OK BUSY -- 0"]);
        let slide = slide(&chain, LOCKSTEP);

        slide.move_absolute(10.0, 0.0, 0.0).await.unwrap();

        assert_eq!(chain.written(), vec!["/1 0 lockstep 1 move abs 100000"]);
    }

    #[tokio::test]
    async fn full_profile_is_converted() {
        let chain = SimulatedChain::start(|_| vec!["@01 1 OK BUSY -- 0"]);
        let slide = slide(&chain, Target::Axis(1));

        slide.move_relative(-2.5, 5.0, 100.0).await.unwrap();

        assert_eq!(chain.written(), vec!["/1 1 move rel -25000 81920 164"]);
    }

    #[tokio::test]
    async fn missing_acceleration_is_read_from_device() {
        let chain = SimulatedChain::start(|line| match line {
            "/1 1 get accel" => vec!["@01 1 OK IDLE -- 205"],
            _ => vec!["@01 1 OK BUSY -- 0"],
        });
        let slide = slide(&chain, Target::Axis(1));

        slide.move_max(5.0, 0.0).await.unwrap();

        assert_eq!(
            chain.written(),
            vec!["/1 1 get accel", "/1 1 move max 81920 205"]
        );
    }

    #[tokio::test]
    async fn velocity_move_keeps_the_speed() {
        let chain = SimulatedChain::start(|_| vec!["@01 1 OK BUSY -- 0"]);
        let slide = slide(&chain, Target::Axis(1));

        slide.move_velocity(5.0, 0.0).await.unwrap();
        slide.move_velocity(-5.0, 100.0).await.unwrap();

        assert_eq!(
            chain.written(),
            vec!["/1 1 move vel 81920", "/1 1 move vel -81920 164"]
        );
    }

    #[tokio::test]
    async fn rejection_is_a_command_fault() {
        let chain = SimulatedChain::start(|_| vec!["@01 1 RJ IDLE -- BADDATA"]);
        let slide = slide(&chain, Target::Axis(1));

        let err = slide.move_min(0.0, 0.0).await.unwrap_err();

        assert_eq!(err, AxisError::Command("Command rejected: BADDATA".to_string()));
    }

    #[tokio::test]
    async fn late_reply_does_not_shift_later_answers() {
        let mut positions = 0;
        let chain = SimulatedChain::start(move |line| match line {
            "/1 1 get pos" => {
                positions += 1;
                if positions == 1 {
                    // The answer to the timed-out stop arrives first.
                    vec!["@01 1 01 OK IDLE -- 0", "@01 1 OK IDLE -- 100000"]
                } else {
                    vec!["@01 1 OK IDLE -- 200000"]
                }
            }
            _ => vec![],
        });
        let slide = slide(&chain, Target::Axis(1));

        assert!(slide.stop().await.unwrap_err().is_transport());
        let first = slide.get_position().await.unwrap();
        let second = slide.get_position().await.unwrap();

        assert!((first - 10.0).abs() < 1e-9);
        assert!((second - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn silence_is_a_transport_fault() {
        let chain = SimulatedChain::start(|_| vec![]);
        let slide = slide(&chain, Target::Axis(1));

        let err = slide.stop().await.unwrap_err();

        assert!(err.is_transport());
    }
}
