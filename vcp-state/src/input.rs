//! Audio Input Control Service instances of one device
//!
//! A device may expose several audio inputs. Each is assigned a small id in
//! discovery order, starting at 1, which is how hosts address it for as long
//! as the device stays connected.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use vcp_api::{
    AudioInputState, Characteristic, GainMode, GainSettings, InputMute, InputStatus, InputType,
};

use crate::error::{Result, StateError};
use crate::Handle;

/// Attribute handles of one Audio Input Control Service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioInputHandles {
    pub service: Handle,
    pub state: Handle,
    pub state_ccc: Handle,
    pub gain_setting: Handle,
    pub input_type: Handle,
    pub status: Handle,
    pub status_ccc: Handle,
    pub control_point: Handle,
    pub description: Handle,
    pub description_ccc: Handle,
}

impl AudioInputHandles {
    pub fn characteristic_for(&self, handle: Handle) -> Option<Characteristic> {
        if handle == 0 {
            return None;
        }
        let table = [
            (self.state, Characteristic::AudioInputState),
            (self.gain_setting, Characteristic::GainSettingProperties),
            (self.input_type, Characteristic::AudioInputType),
            (self.status, Characteristic::AudioInputStatus),
            (self.control_point, Characteristic::AudioInputControlPoint),
            (self.description, Characteristic::AudioInputDescription),
        ];
        table
            .into_iter()
            .find(|(value, _)| *value == handle)
            .map(|(_, characteristic)| characteristic)
    }

    pub fn notification_handles(&self) -> Vec<Handle> {
        [
            (self.state, self.state_ccc),
            (self.status, self.status_ccc),
            (self.description, self.description_ccc),
        ]
        .into_iter()
        .filter(|(value, ccc)| *value != 0 && *ccc != 0)
        .map(|(value, _)| value)
        .collect()
    }
}

/// Last-known state of one audio input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAudioInput {
    pub id: u8,
    pub mute: InputMute,
    pub gain: i8,
    pub status: InputStatus,
    pub input_type: InputType,
    pub change_counter: u8,
    pub gain_mode: GainMode,
    pub description: String,
    pub description_writable: bool,
    pub gain_settings: GainSettings,
    pub handles: AudioInputHandles,
}

impl VolumeAudioInput {
    pub fn new(id: u8, handles: AudioInputHandles) -> Self {
        Self {
            id,
            mute: InputMute::default(),
            gain: 0,
            status: InputStatus::default(),
            input_type: InputType::default(),
            change_counter: 0,
            gain_mode: GainMode::default(),
            description: String::new(),
            description_writable: false,
            gain_settings: GainSettings::default(),
            handles,
        }
    }

    /// Apply a decoded Audio Input State value
    ///
    /// The change counter is always taken so the next write carries the
    /// peer's current value. A gain outside the known gain settings leaves
    /// the remaining fields untouched and is reported as an error.
    pub fn apply_state(&mut self, state: &AudioInputState) -> Result<()> {
        self.change_counter = state.change_counter;
        self.validate_gain(state.gain)?;
        self.gain = state.gain;
        self.mute = state.mute;
        self.gain_mode = state.gain_mode;
        Ok(())
    }

    /// Check a gain against the input's gain settings
    ///
    /// Passes when the peer has not reported its settings yet.
    pub fn validate_gain(&self, gain: i8) -> Result<()> {
        if self.gain_settings.is_known() && !self.gain_settings.contains(gain) {
            return Err(StateError::GainOutOfRange {
                gain,
                min: self.gain_settings.min,
                max: self.gain_settings.max,
            });
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == InputStatus::Active
    }

    pub fn state(&self) -> AudioInputState {
        AudioInputState {
            gain: self.gain,
            mute: self.mute,
            gain_mode: self.gain_mode,
            change_counter: self.change_counter,
        }
    }
}

impl fmt::Display for VolumeAudioInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input#{}: gain={} [{}..{} unit={}] mute={:?} mode={:?} status={:?} type={:?} counter={} desc={:?}{}",
            self.id,
            self.gain,
            self.gain_settings.min,
            self.gain_settings.max,
            self.gain_settings.unit,
            self.mute,
            self.gain_mode,
            self.status,
            self.input_type,
            self.change_counter,
            self.description,
            if self.description_writable { " (writable)" } else { "" }
        )
    }
}

/// Ordered audio inputs of one device
#[derive(Debug, Clone, Default)]
pub struct VolumeAudioInputs {
    inputs: Vec<VolumeAudioInput>,
    /// service handle -> position in `inputs`
    by_service_handle: HashMap<Handle, usize>,
}

impl VolumeAudioInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discovered input and return its id
    ///
    /// Registering a service handle that is already known returns the
    /// existing id.
    pub fn add(&mut self, handles: AudioInputHandles) -> Result<u8> {
        if handles.service != 0 {
            if let Some(&index) = self.by_service_handle.get(&handles.service) {
                return Ok(self.inputs[index].id);
            }
        }
        let id = u8::try_from(self.inputs.len() + 1)
            .map_err(|_| StateError::TooManyInstances("audio input"))?;
        // 0 means the service handle was not discovered; never dedup on it
        if handles.service != 0 {
            self.by_service_handle.insert(handles.service, self.inputs.len());
        }
        self.inputs.push(VolumeAudioInput::new(id, handles));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VolumeAudioInput> {
        self.inputs.iter()
    }

    pub fn find_by_id(&self, id: u8) -> Option<&VolumeAudioInput> {
        self.inputs.iter().find(|input| input.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: u8) -> Option<&mut VolumeAudioInput> {
        self.inputs.iter_mut().find(|input| input.id == id)
    }

    /// First input of the given type
    pub fn find_by_type(&self, input_type: InputType) -> Option<&VolumeAudioInput> {
        self.inputs.iter().find(|input| input.input_type == input_type)
    }

    pub fn find_by_service_handle(&self, service: Handle) -> Option<&VolumeAudioInput> {
        self.by_service_handle
            .get(&service)
            .and_then(|&index| self.inputs.get(index))
    }

    /// Input owning any of its characteristic value handles
    pub fn find_by_handle(&self, handle: Handle) -> Option<&VolumeAudioInput> {
        self.inputs
            .iter()
            .find(|input| input.handles.characteristic_for(handle).is_some())
    }

    pub fn notification_handles(&self) -> Vec<Handle> {
        self.inputs
            .iter()
            .flat_map(|input| input.handles.notification_handles())
            .collect()
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.by_service_handle.clear();
    }
}

impl fmt::Display for VolumeAudioInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "audio inputs: {}", self.inputs.len())?;
        for input in &self.inputs {
            writeln!(f, "  {}", input)?;
        }
        Ok(())
    }
}
