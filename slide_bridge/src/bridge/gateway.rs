use std::fmt;

use tracing::{debug, warn};

use crate::{
    bridge::axis::{AxisError, MotionAxis},
    model::{Argument, DataType, MethodDecl, Variant},
};

pub const STATUS_OK: &str = "Ok";

/// The remote methods published on every slide object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideMethod {
    MoveAbsolute,
    MoveRelative,
    MoveVelocity,
    MoveMax,
    MoveMin,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlideCommand {
    MoveAbsolute {
        position: f64,
        velocity: f64,
        acceleration: f64,
    },
    MoveRelative {
        distance: f64,
        velocity: f64,
        acceleration: f64,
    },
    MoveVelocity {
        velocity: f64,
        acceleration: f64,
    },
    MoveMax {
        velocity: f64,
        acceleration: f64,
    },
    MoveMin {
        velocity: f64,
        acceleration: f64,
    },
    Stop,
}

fn double(name: &'static str, description: &'static str, default: Option<f64>) -> Argument {
    Argument {
        name,
        data_type: DataType::Double,
        description,
        default: default.map(Variant::Double),
    }
}

fn velocity_arg() -> Argument {
    double(
        "velocity [mm/s]",
        "The movement velocity (0 = max. speed)",
        Some(0.0),
    )
}

fn acceleration_arg() -> Argument {
    double(
        "acceleration [mm/s^2]",
        "The movement acceleration (0 = max. accel)",
        Some(0.0),
    )
}

fn status_arg() -> Argument {
    Argument {
        name: "status",
        data_type: DataType::String,
        description: "The response status text",
        default: None,
    }
}

impl SlideMethod {
    pub const ALL: [SlideMethod; 6] = [
        SlideMethod::MoveAbsolute,
        SlideMethod::MoveRelative,
        SlideMethod::MoveVelocity,
        SlideMethod::MoveMax,
        SlideMethod::MoveMin,
        SlideMethod::Stop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SlideMethod::MoveAbsolute => "move_absolute",
            SlideMethod::MoveRelative => "move_relative",
            SlideMethod::MoveVelocity => "move_velocity",
            SlideMethod::MoveMax => "move_max",
            SlideMethod::MoveMin => "move_min",
            SlideMethod::Stop => "stop",
        }
    }

    pub fn decl(&self) -> MethodDecl {
        let inputs = match self {
            SlideMethod::MoveAbsolute => vec![
                double(
                    "absolute position [mm]",
                    "The absolute target position of the slide",
                    None,
                ),
                velocity_arg(),
                acceleration_arg(),
            ],
            SlideMethod::MoveRelative => vec![
                double(
                    "relative position [mm]",
                    "The relative target position of the slide",
                    None,
                ),
                velocity_arg(),
                acceleration_arg(),
            ],
            SlideMethod::MoveVelocity => vec![
                double("velocity [mm/s]", "The movement velocity", None),
                acceleration_arg(),
            ],
            SlideMethod::MoveMax | SlideMethod::MoveMin => {
                vec![velocity_arg(), acceleration_arg()]
            }
            SlideMethod::Stop => Vec::new(),
        };

        MethodDecl {
            name: self.name(),
            inputs,
            outputs: vec![status_arg()],
        }
    }

    /// Builds the command from already resolved arguments, one per declared
    /// input.
    pub fn command(&self, args: &[Variant]) -> Result<SlideCommand, String> {
        let arity = self.decl().inputs.len();
        if args.len() != arity {
            return Err(format!(
                "{} expects {} argument(s), got {}",
                self.name(),
                arity,
                args.len()
            ));
        }

        let mut values = Vec::with_capacity(arity);
        for (index, arg) in args.iter().enumerate() {
            match arg.as_f64() {
                Some(value) if value.is_finite() => values.push(value),
                _ => {
                    return Err(format!(
                        "Argument {} of {} must be a finite number, got {}",
                        index + 1,
                        self.name(),
                        arg
                    ));
                }
            }
        }

        let command = match self {
            SlideMethod::MoveAbsolute => SlideCommand::MoveAbsolute {
                position: values[0],
                velocity: values[1],
                acceleration: values[2],
            },
            SlideMethod::MoveRelative => SlideCommand::MoveRelative {
                distance: values[0],
                velocity: values[1],
                acceleration: values[2],
            },
            SlideMethod::MoveVelocity => SlideCommand::MoveVelocity {
                velocity: values[0],
                acceleration: values[1],
            },
            SlideMethod::MoveMax => SlideCommand::MoveMax {
                velocity: values[0],
                acceleration: values[1],
            },
            SlideMethod::MoveMin => SlideCommand::MoveMin {
                velocity: values[0],
                acceleration: values[1],
            },
            SlideMethod::Stop => SlideCommand::Stop,
        };
        Ok(command)
    }
}

/// Result of one remote method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    pub good: bool,
    pub message: String,
}

impl CommandStatus {
    pub fn ok() -> Self {
        Self {
            good: true,
            message: STATUS_OK.to_string(),
        }
    }

    pub fn bad(message: impl Into<String>) -> Self {
        Self {
            good: false,
            message: message.into(),
        }
    }
}

impl From<Result<(), AxisError>> for CommandStatus {
    fn from(result: Result<(), AxisError>) -> Self {
        match result {
            Ok(()) => CommandStatus::ok(),
            Err(e) => CommandStatus::bad(e.to_string()),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

async fn dispatch(axis: &dyn MotionAxis, command: SlideCommand) -> Result<(), AxisError> {
    if command == SlideCommand::Stop {
        return axis.stop().await;
    }

    // A new move always replaces the running one.
    axis.stop().await?;

    match command {
        SlideCommand::MoveAbsolute {
            position,
            velocity,
            acceleration,
        } => axis.move_absolute(position, velocity, acceleration).await,
        SlideCommand::MoveRelative {
            distance,
            velocity,
            acceleration,
        } => axis.move_relative(distance, velocity, acceleration).await,
        SlideCommand::MoveVelocity {
            velocity,
            acceleration,
        } => axis.move_velocity(velocity, acceleration).await,
        SlideCommand::MoveMax {
            velocity,
            acceleration,
        } => axis.move_max(velocity, acceleration).await,
        SlideCommand::MoveMin {
            velocity,
            acceleration,
        } => axis.move_min(velocity, acceleration).await,
        SlideCommand::Stop => Ok(()),
    }
}

/// Runs `command` against the current handle. Every fault ends up in the
/// returned status.
pub async fn execute(axis: Option<&dyn MotionAxis>, command: SlideCommand) -> CommandStatus {
    let Some(axis) = axis else {
        return CommandStatus::from(Err(AxisError::NotInitialized));
    };

    debug!("Executing {:?}", command);
    let status = CommandStatus::from(dispatch(axis, command).await);
    if !status.good {
        warn!("{:?} failed: {}", command, status.message);
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::{AxisCall, RecordingAxis};

    fn doubles(values: &[f64]) -> Vec<Variant> {
        values.iter().copied().map(Variant::Double).collect()
    }

    #[tokio::test]
    async fn absent_handle_is_not_initialized() {
        let status = execute(
            None,
            SlideCommand::MoveAbsolute {
                position: 10.0,
                velocity: 0.0,
                acceleration: 0.0,
            },
        )
        .await;

        assert_eq!(status, CommandStatus::bad("Axis not initialized!"));
    }

    #[tokio::test]
    async fn move_stops_first() {
        let axis = RecordingAxis::default();

        let status = execute(
            Some(&axis),
            SlideCommand::MoveAbsolute {
                position: 10.0,
                velocity: 5.0,
                acceleration: 100.0,
            },
        )
        .await;

        assert_eq!(status, CommandStatus::ok());
        assert_eq!(
            axis.calls(),
            vec![AxisCall::Stop, AxisCall::MoveAbsolute(10.0, 5.0, 100.0)]
        );
    }

    #[tokio::test]
    async fn stop_is_issued_once() {
        let axis = RecordingAxis::default();
        axis.set_busy(true);

        assert_eq!(execute(Some(&axis), SlideCommand::Stop).await, CommandStatus::ok());
        let followup = execute(
            Some(&axis),
            SlideCommand::MoveAbsolute {
                position: 2.0,
                velocity: 0.0,
                acceleration: 0.0,
            },
        )
        .await;

        assert!(followup.good);
        assert_eq!(
            axis.calls(),
            vec![
                AxisCall::Stop,
                AxisCall::Stop,
                AxisCall::MoveAbsolute(2.0, 0.0, 0.0)
            ]
        );
    }

    #[tokio::test]
    async fn faults_become_bad_status() {
        let axis = RecordingAxis::default();
        axis.fail_moves(AxisError::Command("Command rejected: BADDATA".to_string()));

        let status = execute(
            Some(&axis),
            SlideCommand::MoveVelocity {
                velocity: 3.0,
                acceleration: 0.0,
            },
        )
        .await;

        assert_eq!(status, CommandStatus::bad("Command rejected: BADDATA"));
    }

    #[tokio::test]
    async fn failed_stop_skips_the_move() {
        let axis = RecordingAxis::default();
        axis.fail_stop(AxisError::transport(
            crate::bridge::axis::TransportKind::Timeout,
            "Device did not respond in time",
        ));

        let status = execute(
            Some(&axis),
            SlideCommand::MoveMax {
                velocity: 0.0,
                acceleration: 0.0,
            },
        )
        .await;

        assert!(!status.good);
        assert_eq!(axis.calls(), vec![AxisCall::Stop]);
    }

    #[test]
    fn arguments_map_to_commands() {
        assert_eq!(
            SlideMethod::MoveRelative.command(&doubles(&[-1.5, 2.0, 0.0])),
            Ok(SlideCommand::MoveRelative {
                distance: -1.5,
                velocity: 2.0,
                acceleration: 0.0
            })
        );
        assert_eq!(SlideMethod::Stop.command(&[]), Ok(SlideCommand::Stop));
        assert!(SlideMethod::MoveVelocity.command(&doubles(&[1.0])).is_err());
        assert!(SlideMethod::MoveMin.command(&doubles(&[f64::NAN, 0.0])).is_err());
        assert!(SlideMethod::MoveMax
            .command(&[Variant::Boolean(true), Variant::Double(0.0)])
            .is_err());
    }

    #[test]
    fn declarations_carry_defaults() {
        let decl = SlideMethod::MoveAbsolute.decl();
        assert_eq!(decl.name, "move_absolute");
        assert_eq!(decl.inputs.len(), 3);
        assert_eq!(decl.inputs[0].default, None);
        assert_eq!(decl.inputs[1].default, Some(Variant::Double(0.0)));
        assert_eq!(decl.outputs[0].name, "status");

        let velocity = SlideMethod::MoveVelocity.decl();
        assert_eq!(velocity.inputs[0].default, None);
        assert!(SlideMethod::Stop.decl().inputs.is_empty());
    }
}
