use tracing::warn;

use crate::model::{AddressSpace, VariableHandle, Variant};

/// Last published `busy` and `position` of one slide.
pub struct StateMirror {
    busy_handle: VariableHandle,
    position_handle: VariableHandle,
    last_busy: Option<bool>,
    last_position: Option<f64>,
}

impl StateMirror {
    pub fn new(busy_handle: VariableHandle, position_handle: VariableHandle) -> Self {
        Self {
            busy_handle,
            position_handle,
            last_busy: None,
            last_position: None,
        }
    }

    pub fn last_busy(&self) -> Option<bool> {
        self.last_busy
    }

    pub fn last_position(&self) -> Option<f64> {
        self.last_position
    }

    /// Publishes each value that differs from what was last published.
    /// Floats compare bit for bit.
    pub fn update(&mut self, space: &mut dyn AddressSpace, busy: bool, position: f64) {
        if self.last_busy != Some(busy) {
            match space.publish(self.busy_handle, Variant::Boolean(busy)) {
                Ok(()) => self.last_busy = Some(busy),
                Err(e) => warn!("Failed to publish busy: {}", e),
            }
        }

        if self.last_position.map(f64::to_bits) != Some(position.to_bits()) {
            match space.publish(self.position_handle, Variant::Double(position)) {
                Ok(()) => self.last_position = Some(position),
                Err(e) => warn!("Failed to publish position: {}", e),
            }
        }
    }
}
