use super::AsciiCommand;

/// Speed and acceleration in native units. `Default` leaves both to the
/// device settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Default,
    Custom {
        speed: i64,
        accel: i64,
    },
}

impl Profile {
    fn suffix(&self) -> String {
        match self {
            Profile::Default => String::new(),
            Profile::Custom { speed, accel } => format!(" {} {}", speed, accel),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Absolute { position: i64, profile: Profile },
    Relative { distance: i64, profile: Profile },
    Velocity { speed: i64, accel: Option<i64> },
    Max { profile: Profile },
    Min { profile: Profile },
}

impl AsciiCommand for Move {
    fn payload(&self) -> String {
        match self {
            Move::Absolute { position, profile } => {
                format!("move abs {}{}", position, profile.suffix())
            }
            Move::Relative { distance, profile } => {
                format!("move rel {}{}", distance, profile.suffix())
            }
            Move::Velocity { speed, accel } => match accel {
                Some(accel) => format!("move vel {} {}", speed, accel),
                None => format!("move vel {}", speed),
            },
            Move::Max { profile } => format!("move max{}", profile.suffix()),
            Move::Min { profile } => format!("move min{}", profile.suffix()),
        }
    }
}
