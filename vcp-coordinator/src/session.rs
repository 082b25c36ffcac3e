//! Per-device session held by the coordinator

use tokio::time::Instant;
use vcp_api::{ControlCommand, GainMode, InputCommand, InputMute, OffsetCommand, VolumeCommand};
use vcp_state::DeviceMirror;

use crate::error::{CoordinatorError, Result};

/// A connected device and everything mirrored from it
#[derive(Debug)]
pub struct DeviceSession {
    pub mirror: DeviceMirror,
    pub connected_at: Instant,
}

impl DeviceSession {
    pub fn new(mirror: DeviceMirror) -> Self {
        Self {
            mirror,
            connected_at: Instant::now(),
        }
    }

    /// Check that `command` can be written to this device
    pub fn check_command(&self, command: &ControlCommand) -> Result<()> {
        let instance = command.instance();
        if !self.mirror.has_instance(instance) {
            return Err(CoordinatorError::UnknownInstance {
                device: self.mirror.device.clone(),
                instance,
            });
        }
        if let ControlCommand::Input {
            input_id,
            command: InputCommand::SetGain(gain),
        } = command
        {
            if let Some(input) = self.mirror.inputs.find_by_id(*input_id) {
                input.validate_gain(*gain)?;
            }
        }
        Ok(())
    }

    /// Whether the mirrored state already equals what `command` would set
    ///
    /// Peers neither bump the change counter nor notify for writes that
    /// change nothing, so an accepted no-op write is complete on acceptance.
    pub fn is_noop(&self, command: &ControlCommand) -> bool {
        let mirror = &self.mirror;
        match command {
            ControlCommand::Volume(command) => {
                let volume = &mirror.volume;
                match command {
                    VolumeCommand::SetAbsoluteVolume(value) => volume.volume == *value,
                    VolumeCommand::Mute => volume.mute,
                    VolumeCommand::Unmute => !volume.mute,
                    VolumeCommand::VolumeUp => volume.volume == u8::MAX,
                    VolumeCommand::VolumeDown => volume.volume == 0,
                    VolumeCommand::UnmuteVolumeUp => volume.volume == u8::MAX && !volume.mute,
                    VolumeCommand::UnmuteVolumeDown => volume.volume == 0 && !volume.mute,
                }
            }
            ControlCommand::Offset {
                offset_id,
                command: OffsetCommand::SetVolumeOffset(value),
            } => mirror
                .offsets
                .find_by_id(*offset_id)
                .is_some_and(|offset| offset.offset == *value),
            ControlCommand::Input { input_id, command } => {
                let Some(input) = mirror.inputs.find_by_id(*input_id) else {
                    return false;
                };
                match command {
                    InputCommand::SetGain(gain) => input.gain == *gain,
                    InputCommand::Mute => input.mute == InputMute::Muted,
                    InputCommand::Unmute => input.mute == InputMute::NotMuted,
                    InputCommand::SetManualGainMode => {
                        matches!(input.gain_mode, GainMode::Manual | GainMode::ManualOnly)
                    }
                    InputCommand::SetAutoGainMode => {
                        matches!(input.gain_mode, GainMode::Automatic | GainMode::AutomaticOnly)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use vcp_api::{GainSettings, InstanceRef};
    use vcp_state::{
        AudioInputHandles, DeviceId, StateError, VolumeControlHandles, VolumeControlState,
    };

    fn session(volume: u8, mute: bool) -> DeviceSession {
        let mut state = VolumeControlState::new(VolumeControlHandles {
            state: 0x12,
            control_point: 0x15,
            ..Default::default()
        });
        state.volume = volume;
        state.mute = mute;
        let mut mirror = DeviceMirror::new(DeviceId::new("aa:bb:cc:dd:ee:01"), state);
        mirror
            .inputs
            .add(AudioInputHandles {
                service: 0x40,
                state: 0x42,
                control_point: 0x44,
                ..Default::default()
            })
            .unwrap();
        mirror.inputs.find_by_id_mut(1).unwrap().gain_settings = GainSettings {
            unit: 1,
            min: -20,
            max: 20,
        };
        DeviceSession::new(mirror)
    }

    #[rstest]
    #[case(VolumeCommand::SetAbsoluteVolume(40), 40, false, true)]
    #[case(VolumeCommand::SetAbsoluteVolume(41), 40, false, false)]
    #[case(VolumeCommand::Mute, 40, true, true)]
    #[case(VolumeCommand::Unmute, 40, true, false)]
    #[case(VolumeCommand::VolumeUp, 255, true, true)]
    #[case(VolumeCommand::UnmuteVolumeUp, 255, true, false)]
    #[case(VolumeCommand::VolumeDown, 0, false, true)]
    fn test_volume_noop(
        #[case] command: VolumeCommand,
        #[case] volume: u8,
        #[case] mute: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(session(volume, mute).is_noop(&command.into()), expected);
    }

    #[tokio::test]
    async fn test_check_command() {
        let session = session(0, false);
        assert!(session.check_command(&VolumeCommand::Mute.into()).is_ok());

        let missing = ControlCommand::Offset {
            offset_id: 1,
            command: OffsetCommand::SetVolumeOffset(3),
        };
        assert!(matches!(
            session.check_command(&missing),
            Err(CoordinatorError::UnknownInstance {
                instance: InstanceRef::Offset(1),
                ..
            })
        ));

        let too_loud = ControlCommand::Input {
            input_id: 1,
            command: InputCommand::SetGain(30),
        };
        assert!(matches!(
            session.check_command(&too_loud),
            Err(CoordinatorError::State(StateError::GainOutOfRange { gain: 30, .. }))
        ));
    }
}
