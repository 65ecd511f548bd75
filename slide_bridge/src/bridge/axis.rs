use std::fmt;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    ConnectionClosed,
    ConnectionFailed,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Timeout => "timeout",
            TransportKind::ConnectionClosed => "connection closed",
            TransportKind::ConnectionFailed => "connection failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AxisError {
    #[error("Axis not initialized!")]
    NotInitialized,

    /// The link to the controller is gone or not answering. The handle that
    /// produced it is no longer usable.
    #[error("{message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },

    #[error("{0}")]
    Command(String),

    #[error("{0}")]
    Init(String),
}

impl AxisError {
    pub fn is_transport(&self) -> bool {
        matches!(self, AxisError::Transport { .. })
    }

    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        AxisError::Transport {
            kind,
            message: message.into(),
        }
    }
}

/// One physical axis or a lockstep group, in millimetres.
///
/// A velocity or acceleration of `0.0` asks the controller for its
/// configured maximum.
#[async_trait]
pub trait MotionAxis: Send + Sync {
    async fn is_busy(&self) -> Result<bool, AxisError>;

    async fn get_position(&self) -> Result<f64, AxisError>;

    async fn move_absolute(
        &self,
        position: f64,
        velocity: f64,
        acceleration: f64,
    ) -> Result<(), AxisError>;

    async fn move_relative(
        &self,
        distance: f64,
        velocity: f64,
        acceleration: f64,
    ) -> Result<(), AxisError>;

    async fn move_velocity(&self, velocity: f64, acceleration: f64) -> Result<(), AxisError>;

    async fn move_max(&self, velocity: f64, acceleration: f64) -> Result<(), AxisError>;

    async fn move_min(&self, velocity: f64, acceleration: f64) -> Result<(), AxisError>;

    async fn stop(&self) -> Result<(), AxisError>;
}

pub type AxisHandle = Box<dyn MotionAxis>;

/// Detects, homes and wraps a controller. Called again after every failed
/// attempt or lost connection.
#[async_trait]
pub trait AxisFactory: Send + Sync {
    async fn init(&self) -> Result<AxisHandle, AxisError>;
}
