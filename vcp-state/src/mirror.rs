//! Per-device mirror of everything the host knows about a peer
//!
//! The mirror is pure data: it decodes values read from or notified by the
//! peer and stores them. Deciding what a change means for pending
//! operations is the coordinator's job.

use serde::{Deserialize, Serialize};
use std::fmt;

use vcp_api::{
    decode_description, AudioInputState, AudioLocation, Characteristic, GainSettings,
    InputStatus, InputType, InstanceRef, OffsetState, VolumeFlags, VolumeState,
};

use crate::error::{Result, StateError};
use crate::input::VolumeAudioInputs;
use crate::model::DeviceId;
use crate::offset::VolumeOffsets;
use crate::volume::VolumeControlState;
use crate::Handle;

/// Typed state of one service instance, as carried in upward events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Volume(VolumeState),
    Offset(OffsetState),
    Input(AudioInputState),
}

impl InstanceState {
    pub fn change_counter(&self) -> u8 {
        match self {
            InstanceState::Volume(state) => state.change_counter,
            InstanceState::Offset(state) => state.change_counter,
            InstanceState::Input(state) => state.change_counter,
        }
    }
}

/// What a characteristic value changed in the mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorUpdate {
    /// A state characteristic (carrying a change counter) was applied
    State {
        instance: InstanceRef,
        state: InstanceState,
    },
    VolumeFlags(VolumeFlags),
    OffsetLocation {
        offset_id: u8,
        location: AudioLocation,
    },
    OffsetDescription {
        offset_id: u8,
        description: String,
    },
    InputStatus {
        input_id: u8,
        status: InputStatus,
    },
    InputType {
        input_id: u8,
        input_type: InputType,
    },
    InputDescription {
        input_id: u8,
        description: String,
    },
    GainSettings {
        input_id: u8,
        settings: GainSettings,
    },
    /// The value was for a characteristic without mirrored state
    Ignored,
}

/// Everything known about one connected device
#[derive(Debug, Clone)]
pub struct DeviceMirror {
    pub device: DeviceId,
    pub volume: VolumeControlState,
    pub inputs: VolumeAudioInputs,
    pub offsets: VolumeOffsets,
}

impl DeviceMirror {
    pub fn new(device: DeviceId, volume: VolumeControlState) -> Self {
        Self {
            device,
            volume,
            inputs: VolumeAudioInputs::new(),
            offsets: VolumeOffsets::new(),
        }
    }

    /// Map a characteristic value handle to its instance and characteristic
    pub fn instance_for_handle(&self, handle: Handle) -> Option<(InstanceRef, Characteristic)> {
        if let Some(characteristic) = self.volume.handles.characteristic_for(handle) {
            return Some((InstanceRef::Volume, characteristic));
        }
        if let Some(offset) = self.offsets.find_by_handle(handle) {
            let characteristic = offset.handles.characteristic_for(handle)?;
            return Some((InstanceRef::Offset(offset.id), characteristic));
        }
        if let Some(input) = self.inputs.find_by_handle(handle) {
            let characteristic = input.handles.characteristic_for(handle)?;
            return Some((InstanceRef::Input(input.id), characteristic));
        }
        None
    }

    pub fn has_instance(&self, instance: InstanceRef) -> bool {
        self.control_point_handle(instance).is_some()
    }

    pub fn control_point_handle(&self, instance: InstanceRef) -> Option<Handle> {
        let handle = match instance {
            InstanceRef::Volume => self.volume.handles.control_point,
            InstanceRef::Offset(id) => self.offsets.find_by_id(id)?.handles.control_point,
            InstanceRef::Input(id) => self.inputs.find_by_id(id)?.handles.control_point,
        };
        (handle != 0).then_some(handle)
    }

    pub fn state_handle(&self, instance: InstanceRef) -> Option<Handle> {
        let handle = match instance {
            InstanceRef::Volume => self.volume.handles.state,
            InstanceRef::Offset(id) => self.offsets.find_by_id(id)?.handles.state,
            InstanceRef::Input(id) => self.inputs.find_by_id(id)?.handles.state,
        };
        (handle != 0).then_some(handle)
    }

    /// Last-known change counter of an instance
    pub fn change_counter(&self, instance: InstanceRef) -> Option<u8> {
        self.instance_state(instance).map(|state| state.change_counter())
    }

    pub fn instance_state(&self, instance: InstanceRef) -> Option<InstanceState> {
        match instance {
            InstanceRef::Volume => self
                .volume
                .is_present()
                .then(|| InstanceState::Volume(self.volume.state())),
            InstanceRef::Offset(id) => self
                .offsets
                .find_by_id(id)
                .map(|offset| InstanceState::Offset(offset.state())),
            InstanceRef::Input(id) => self
                .inputs
                .find_by_id(id)
                .map(|input| InstanceState::Input(input.state())),
        }
    }

    /// Value handles to subscribe to once the device is registered
    pub fn notification_handles(&self) -> Vec<Handle> {
        let mut handles = self.volume.handles.notification_handles();
        handles.extend(self.offsets.notification_handles());
        handles.extend(self.inputs.notification_handles());
        handles
    }

    /// Decode a value read from or notified on `handle` and store it
    pub fn apply_value(&mut self, handle: Handle, value: &[u8]) -> Result<MirrorUpdate> {
        let (instance, characteristic) = self
            .instance_for_handle(handle)
            .ok_or(StateError::UnknownHandle(handle))?;

        match (instance, characteristic) {
            (InstanceRef::Volume, Characteristic::VolumeState) => {
                let state = VolumeState::decode(value)?;
                self.volume.apply_state(&state);
                Ok(MirrorUpdate::State {
                    instance,
                    state: InstanceState::Volume(state),
                })
            }
            (InstanceRef::Volume, Characteristic::VolumeFlags) => {
                let flags = VolumeFlags::decode(value)?;
                self.volume.flags = flags;
                Ok(MirrorUpdate::VolumeFlags(flags))
            }
            (InstanceRef::Offset(id), characteristic) => {
                let offset = self
                    .offsets
                    .find_by_id_mut(id)
                    .ok_or(StateError::UnknownOffset(id))?;
                match characteristic {
                    Characteristic::VolumeOffsetState => {
                        let state = OffsetState::decode(value)?;
                        offset.apply_state(&state);
                        Ok(MirrorUpdate::State {
                            instance,
                            state: InstanceState::Offset(state),
                        })
                    }
                    Characteristic::AudioLocation => {
                        offset.location = AudioLocation::decode(value)?;
                        Ok(MirrorUpdate::OffsetLocation {
                            offset_id: id,
                            location: offset.location,
                        })
                    }
                    Characteristic::AudioOutputDescription => {
                        offset.description = decode_description(value);
                        Ok(MirrorUpdate::OffsetDescription {
                            offset_id: id,
                            description: offset.description.clone(),
                        })
                    }
                    _ => Ok(MirrorUpdate::Ignored),
                }
            }
            (InstanceRef::Input(id), characteristic) => {
                let input = self
                    .inputs
                    .find_by_id_mut(id)
                    .ok_or(StateError::UnknownInput(id))?;
                match characteristic {
                    Characteristic::AudioInputState => {
                        let state = AudioInputState::decode(value)?;
                        input.apply_state(&state)?;
                        Ok(MirrorUpdate::State {
                            instance,
                            state: InstanceState::Input(state),
                        })
                    }
                    Characteristic::AudioInputStatus => {
                        input.status = InputStatus::decode(value)?;
                        Ok(MirrorUpdate::InputStatus {
                            input_id: id,
                            status: input.status,
                        })
                    }
                    Characteristic::AudioInputType => {
                        input.input_type = InputType::decode(value)?;
                        Ok(MirrorUpdate::InputType {
                            input_id: id,
                            input_type: input.input_type,
                        })
                    }
                    Characteristic::AudioInputDescription => {
                        input.description = decode_description(value);
                        Ok(MirrorUpdate::InputDescription {
                            input_id: id,
                            description: input.description.clone(),
                        })
                    }
                    Characteristic::GainSettingProperties => {
                        input.gain_settings = GainSettings::decode(value)?;
                        Ok(MirrorUpdate::GainSettings {
                            input_id: id,
                            settings: input.gain_settings,
                        })
                    }
                    _ => Ok(MirrorUpdate::Ignored),
                }
            }
            _ => Ok(MirrorUpdate::Ignored),
        }
    }

    /// Reset on disconnect
    pub fn clear(&mut self) {
        self.volume.clear();
        self.inputs.clear();
        self.offsets.clear();
    }
}

impl fmt::Display for DeviceMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "device {}", self.device)?;
        writeln!(f, "  {}", self.volume)?;
        write!(f, "  {}", self.offsets)?;
        write!(f, "  {}", self.inputs)
    }
}
