//! Volume Control Service state of one device

use serde::{Deserialize, Serialize};
use std::fmt;

use vcp_api::{Characteristic, VolumeFlags, VolumeState};

use crate::Handle;

/// Attribute handles of the Volume Control Service
///
/// A handle of 0 means the characteristic (or its CCC descriptor) was not
/// discovered on the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeControlHandles {
    pub service: Handle,
    pub state: Handle,
    pub state_ccc: Handle,
    pub control_point: Handle,
    pub flags: Handle,
    pub flags_ccc: Handle,
}

impl VolumeControlHandles {
    /// Which characteristic a value handle belongs to
    pub fn characteristic_for(&self, handle: Handle) -> Option<Characteristic> {
        if handle == 0 {
            return None;
        }
        if handle == self.state {
            Some(Characteristic::VolumeState)
        } else if handle == self.control_point {
            Some(Characteristic::VolumeControlPoint)
        } else if handle == self.flags {
            Some(Characteristic::VolumeFlags)
        } else {
            None
        }
    }

    /// Value handles whose characteristic can notify
    pub fn notification_handles(&self) -> Vec<Handle> {
        [(self.state, self.state_ccc), (self.flags, self.flags_ccc)]
            .into_iter()
            .filter(|(value, ccc)| *value != 0 && *ccc != 0)
            .map(|(value, _)| value)
            .collect()
    }
}

/// Last-known Volume Control state of a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeControlState {
    pub volume: u8,
    pub mute: bool,
    pub flags: VolumeFlags,
    pub change_counter: u8,
    pub handles: VolumeControlHandles,
}

impl VolumeControlState {
    pub fn new(handles: VolumeControlHandles) -> Self {
        Self {
            handles,
            ..Default::default()
        }
    }

    /// Whether the device exposes a Volume Control Service at all
    pub fn is_present(&self) -> bool {
        self.handles.control_point != 0
    }

    pub fn apply_state(&mut self, state: &VolumeState) {
        self.change_counter = state.change_counter;
        self.volume = state.volume;
        self.mute = state.mute;
    }

    pub fn state(&self) -> VolumeState {
        VolumeState {
            volume: self.volume,
            mute: self.mute,
            change_counter: self.change_counter,
        }
    }

    /// Forget everything learned from the peer, keeping the handles
    pub fn clear(&mut self) {
        *self = Self::new(self.handles);
    }
}

impl fmt::Display for VolumeControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "volume: {} muted={} counter={} flags=0x{:02x} cp=0x{:04x}",
            self.volume, self.mute, self.change_counter, self.flags.0, self.handles.control_point
        )
    }
}
