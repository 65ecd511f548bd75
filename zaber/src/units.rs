//! Conversion between millimetres and device native units.
//!
//! Native velocity is microsteps per second times 1.6384 and native
//! acceleration is microsteps per second squared times 1.6384 / 10000.

pub const VELOCITY_FACTOR: f64 = 1.6384;
pub const ACCELERATION_FACTOR: f64 = 1.6384 / 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    microstep_mm: f64,
}

impl Resolution {
    /// `microstep_mm` is the travel of one microstep in millimetres.
    pub fn new(microstep_mm: f64) -> Self {
        Self { microstep_mm }
    }

    pub fn position_to_native(&self, mm: f64) -> i64 {
        (mm / self.microstep_mm).round() as i64
    }

    pub fn position_from_native(&self, native: i64) -> f64 {
        native as f64 * self.microstep_mm
    }

    pub fn velocity_to_native(&self, mm_per_s: f64) -> i64 {
        (mm_per_s / self.microstep_mm * VELOCITY_FACTOR).round() as i64
    }

    pub fn acceleration_to_native(&self, mm_per_s2: f64) -> i64 {
        (mm_per_s2 / self.microstep_mm * ACCELERATION_FACTOR).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TENTH_MICRON: Resolution = Resolution { microstep_mm: 0.0001 };

    #[test]
    fn position_round_trips_through_microsteps() {
        assert_eq!(TENTH_MICRON.position_to_native(10.0), 100_000);
        assert_eq!(TENTH_MICRON.position_to_native(-2.5), -25_000);
        assert!((TENTH_MICRON.position_from_native(100_000) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_and_acceleration_scale() {
        assert_eq!(TENTH_MICRON.velocity_to_native(5.0), 81_920);
        assert_eq!(TENTH_MICRON.velocity_to_native(-5.0), -81_920);
        assert_eq!(TENTH_MICRON.acceleration_to_native(100.0), 164);
    }
}
