//! Typed control-point commands
//!
//! A command is the semantic form of a control-point write: what to do, and
//! to which service instance. It deliberately carries no change counter;
//! the counter is supplied at encode time from the device's last-known state
//! so that the same command can be resubmitted after a counter refresh.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::encode;
use crate::error::Result;
use crate::opcode::{InputOpcode, OffsetOpcode, VolumeOpcode};
use crate::service::Service;

/// Lowest volume offset accepted by a Volume Offset Control Point
pub const VOLUME_OFFSET_MIN: i16 = -255;
/// Highest volume offset accepted by a Volume Offset Control Point
pub const VOLUME_OFFSET_MAX: i16 = 255;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Parameter '{parameter}' value '{value}' is out of range ({min}..={max})")]
    RangeError {
        parameter: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Parameter '{parameter}' value '{value}' is invalid: {reason}")]
    InvalidValue {
        parameter: String,
        value: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn range_error(
        parameter: &str,
        min: impl fmt::Display,
        max: impl fmt::Display,
        value: impl fmt::Display,
    ) -> Self {
        Self::RangeError {
            parameter: parameter.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn invalid_value(parameter: &str, value: impl fmt::Display, reason: &str) -> Self {
        Self::InvalidValue {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Trait for commands that can be checked before they are encoded
pub trait Validate {
    /// Light validation at the API boundary
    ///
    /// Only checks what is knowable without the peer's state; bounds that
    /// depend on the peer (such as an input's gain range) are checked by
    /// the caller against the mirrored state.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }
}

/// Addresses one service instance on a device
///
/// Volume Control exists once per device; offsets and inputs are numbered
/// per device in discovery order starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstanceRef {
    Volume,
    Offset(u8),
    Input(u8),
}

impl InstanceRef {
    pub fn service(&self) -> Service {
        match self {
            InstanceRef::Volume => Service::VolumeControl,
            InstanceRef::Offset(_) => Service::VolumeOffset,
            InstanceRef::Input(_) => Service::AudioInputControl,
        }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceRef::Volume => write!(f, "volume"),
            InstanceRef::Offset(id) => write!(f, "offset#{}", id),
            InstanceRef::Input(id) => write!(f, "input#{}", id),
        }
    }
}

/// Volume Control Point commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeCommand {
    VolumeDown,
    VolumeUp,
    UnmuteVolumeDown,
    UnmuteVolumeUp,
    SetAbsoluteVolume(u8),
    Unmute,
    Mute,
}

impl VolumeCommand {
    pub fn opcode(&self) -> VolumeOpcode {
        match self {
            VolumeCommand::VolumeDown => VolumeOpcode::VolumeDown,
            VolumeCommand::VolumeUp => VolumeOpcode::VolumeUp,
            VolumeCommand::UnmuteVolumeDown => VolumeOpcode::UnmuteVolumeDown,
            VolumeCommand::UnmuteVolumeUp => VolumeOpcode::UnmuteVolumeUp,
            VolumeCommand::SetAbsoluteVolume(_) => VolumeOpcode::SetAbsoluteVolume,
            VolumeCommand::Unmute => VolumeOpcode::Unmute,
            VolumeCommand::Mute => VolumeOpcode::Mute,
        }
    }

    pub fn arguments(&self) -> Vec<u8> {
        match self {
            VolumeCommand::SetAbsoluteVolume(volume) => vec![*volume],
            _ => Vec::new(),
        }
    }
}

impl Validate for VolumeCommand {}

/// Volume Offset Control Point commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetCommand {
    SetVolumeOffset(i16),
}

impl OffsetCommand {
    pub fn opcode(&self) -> OffsetOpcode {
        match self {
            OffsetCommand::SetVolumeOffset(_) => OffsetOpcode::SetVolumeOffset,
        }
    }

    pub fn arguments(&self) -> Vec<u8> {
        match self {
            OffsetCommand::SetVolumeOffset(offset) => offset.to_le_bytes().to_vec(),
        }
    }
}

impl Validate for OffsetCommand {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self {
            OffsetCommand::SetVolumeOffset(offset)
                if !(VOLUME_OFFSET_MIN..=VOLUME_OFFSET_MAX).contains(offset) =>
            {
                Err(ValidationError::range_error(
                    "volume_offset",
                    VOLUME_OFFSET_MIN,
                    VOLUME_OFFSET_MAX,
                    offset,
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Audio Input Control Point commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputCommand {
    SetGain(i8),
    Unmute,
    Mute,
    SetManualGainMode,
    SetAutoGainMode,
}

impl InputCommand {
    pub fn opcode(&self) -> InputOpcode {
        match self {
            InputCommand::SetGain(_) => InputOpcode::SetGain,
            InputCommand::Unmute => InputOpcode::Unmute,
            InputCommand::Mute => InputOpcode::Mute,
            InputCommand::SetManualGainMode => InputOpcode::SetManualGainMode,
            InputCommand::SetAutoGainMode => InputOpcode::SetAutoGainMode,
        }
    }

    pub fn arguments(&self) -> Vec<u8> {
        match self {
            InputCommand::SetGain(gain) => gain.to_le_bytes().to_vec(),
            _ => Vec::new(),
        }
    }
}

impl Validate for InputCommand {}

/// A control-point command addressed to one service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCommand {
    Volume(VolumeCommand),
    Offset { offset_id: u8, command: OffsetCommand },
    Input { input_id: u8, command: InputCommand },
}

impl ControlCommand {
    pub fn service(&self) -> Service {
        self.instance().service()
    }

    /// The service instance this command is written to
    pub fn instance(&self) -> InstanceRef {
        match self {
            ControlCommand::Volume(_) => InstanceRef::Volume,
            ControlCommand::Offset { offset_id, .. } => InstanceRef::Offset(*offset_id),
            ControlCommand::Input { input_id, .. } => InstanceRef::Input(*input_id),
        }
    }

    /// Raw opcode byte
    pub fn opcode(&self) -> u8 {
        match self {
            ControlCommand::Volume(command) => command.opcode() as u8,
            ControlCommand::Offset { command, .. } => command.opcode() as u8,
            ControlCommand::Input { command, .. } => command.opcode() as u8,
        }
    }

    /// Argument bytes following the change counter
    pub fn arguments(&self) -> Vec<u8> {
        match self {
            ControlCommand::Volume(command) => command.arguments(),
            ControlCommand::Offset { command, .. } => command.arguments(),
            ControlCommand::Input { command, .. } => command.arguments(),
        }
    }

    /// Encode the control-point write with the given change counter
    pub fn encode(&self, change_counter: u8) -> Result<Vec<u8>> {
        self.validate()?;
        encode(self.service(), self.opcode(), &self.arguments(), change_counter)
    }
}

impl Validate for ControlCommand {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        match self {
            ControlCommand::Volume(command) => command.validate(),
            ControlCommand::Offset { command, .. } => command.validate(),
            ControlCommand::Input { command, .. } => command.validate(),
        }
    }
}

impl From<VolumeCommand> for ControlCommand {
    fn from(command: VolumeCommand) -> Self {
        ControlCommand::Volume(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    #[test]
    fn test_set_absolute_volume_encoding() {
        let command = ControlCommand::Volume(VolumeCommand::SetAbsoluteVolume(40));
        assert_eq!(command.encode(5).unwrap(), vec![0x04, 0x05, 40]);
    }

    #[test]
    fn test_mute_has_no_arguments() {
        let command = ControlCommand::Volume(VolumeCommand::Mute);
        assert_eq!(command.encode(0xFF).unwrap(), vec![0x06, 0xFF]);
    }

    #[test]
    fn test_offset_encoding_is_little_endian() {
        let command = ControlCommand::Offset {
            offset_id: 1,
            command: OffsetCommand::SetVolumeOffset(-2),
        };
        assert_eq!(command.encode(3).unwrap(), vec![0x01, 0x03, 0xFE, 0xFF]);
        assert_eq!(command.instance(), InstanceRef::Offset(1));
    }

    #[test]
    fn test_offset_out_of_range_is_rejected() {
        let command = ControlCommand::Offset {
            offset_id: 1,
            command: OffsetCommand::SetVolumeOffset(300),
        };
        assert!(matches!(command.encode(0), Err(ApiError::InvalidParameter(_))));
    }

    #[test]
    fn test_set_gain_encoding() {
        let command = ControlCommand::Input {
            input_id: 2,
            command: InputCommand::SetGain(-6),
        };
        assert_eq!(command.encode(9).unwrap(), vec![0x01, 0x09, 0xFA]);
        assert_eq!(command.service(), Service::AudioInputControl);
    }

    #[test]
    fn test_instance_display() {
        assert_eq!(InstanceRef::Volume.to_string(), "volume");
        assert_eq!(InstanceRef::Input(3).to_string(), "input#3");
    }
}
