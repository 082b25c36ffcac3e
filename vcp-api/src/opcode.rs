//! Control-point opcodes of the three services
//!
//! Each service has its own opcode space; the same byte means different
//! things on different control points, so opcodes are always interpreted
//! together with the [`Service`] they are written to.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::service::Service;

/// Volume Control Point opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VolumeOpcode {
    VolumeDown = 0x00,
    VolumeUp = 0x01,
    UnmuteVolumeDown = 0x02,
    UnmuteVolumeUp = 0x03,
    SetAbsoluteVolume = 0x04,
    Unmute = 0x05,
    Mute = 0x06,
}

/// Volume Offset Control Point opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OffsetOpcode {
    SetVolumeOffset = 0x01,
}

/// Audio Input Control Point opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InputOpcode {
    SetGain = 0x01,
    Unmute = 0x02,
    Mute = 0x03,
    SetManualGainMode = 0x04,
    SetAutoGainMode = 0x05,
}

impl VolumeOpcode {
    /// Number of argument bytes following the change counter
    pub fn argument_len(&self) -> usize {
        match self {
            VolumeOpcode::SetAbsoluteVolume => 1,
            _ => 0,
        }
    }
}

impl OffsetOpcode {
    pub fn argument_len(&self) -> usize {
        2
    }
}

impl InputOpcode {
    pub fn argument_len(&self) -> usize {
        match self {
            InputOpcode::SetGain => 1,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for VolumeOpcode {
    type Error = ApiError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(VolumeOpcode::VolumeDown),
            0x01 => Ok(VolumeOpcode::VolumeUp),
            0x02 => Ok(VolumeOpcode::UnmuteVolumeDown),
            0x03 => Ok(VolumeOpcode::UnmuteVolumeUp),
            0x04 => Ok(VolumeOpcode::SetAbsoluteVolume),
            0x05 => Ok(VolumeOpcode::Unmute),
            0x06 => Ok(VolumeOpcode::Mute),
            opcode => Err(ApiError::UnsupportedOpcode {
                service: Service::VolumeControl,
                opcode,
            }),
        }
    }
}

impl TryFrom<u8> for OffsetOpcode {
    type Error = ApiError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(OffsetOpcode::SetVolumeOffset),
            opcode => Err(ApiError::UnsupportedOpcode {
                service: Service::VolumeOffset,
                opcode,
            }),
        }
    }
}

impl TryFrom<u8> for InputOpcode {
    type Error = ApiError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(InputOpcode::SetGain),
            0x02 => Ok(InputOpcode::Unmute),
            0x03 => Ok(InputOpcode::Mute),
            0x04 => Ok(InputOpcode::SetManualGainMode),
            0x05 => Ok(InputOpcode::SetAutoGainMode),
            opcode => Err(ApiError::UnsupportedOpcode {
                service: Service::AudioInputControl,
                opcode,
            }),
        }
    }
}

/// Number of argument bytes `opcode` takes on `service`'s control point
///
/// Fails with [`ApiError::UnsupportedOpcode`] when the opcode is not part of
/// the service's recognized set.
pub fn argument_len(service: Service, opcode: u8) -> Result<usize> {
    match service {
        Service::VolumeControl => VolumeOpcode::try_from(opcode).map(|op| op.argument_len()),
        Service::VolumeOffset => OffsetOpcode::try_from(opcode).map(|op| op.argument_len()),
        Service::AudioInputControl => InputOpcode::try_from(opcode).map(|op| op.argument_len()),
    }
}
