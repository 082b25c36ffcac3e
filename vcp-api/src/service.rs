use serde::{Deserialize, Serialize};
use std::fmt;

/// Bluetooth base UUID suffix that 16-bit SIG-assigned UUIDs expand onto
const BASE_UUID_SUFFIX: &str = "0000-1000-8000-00805F9B34FB";

/// Represents the GATT services taking part in the Volume Control Profile
///
/// Volume Control is the primary service of a renderer; Volume Offset and
/// Audio Input Control are included services, each of which may appear
/// several times on a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    /// Audio Input Control Service - gain, mute and mode of one audio input
    AudioInputControl,

    /// Volume Control Service - the device's rendering volume and mute
    VolumeControl,

    /// Volume Offset Control Service - per-output offset and audio location
    VolumeOffset,
}

impl Service {
    /// Get the name of this service as a string
    pub fn name(&self) -> &'static str {
        match self {
            Service::AudioInputControl => "AudioInputControl",
            Service::VolumeControl => "VolumeControl",
            Service::VolumeOffset => "VolumeOffset",
        }
    }

    /// 16-bit SIG-assigned UUID of the service
    pub fn uuid16(&self) -> u16 {
        match self {
            Service::AudioInputControl => 0x1843,
            Service::VolumeControl => 0x1844,
            Service::VolumeOffset => 0x1845,
        }
    }

    /// Full 128-bit UUID string of the service
    pub fn uuid(&self) -> String {
        expand_uuid16(self.uuid16())
    }

    /// Look up a service by its 16-bit UUID
    pub fn from_uuid16(uuid: u16) -> Option<Self> {
        match uuid {
            0x1843 => Some(Service::AudioInputControl),
            0x1844 => Some(Service::VolumeControl),
            0x1845 => Some(Service::VolumeOffset),
            _ => None,
        }
    }

    /// The control point characteristic of this service
    pub fn control_point(&self) -> Characteristic {
        match self {
            Service::AudioInputControl => Characteristic::AudioInputControlPoint,
            Service::VolumeControl => Characteristic::VolumeControlPoint,
            Service::VolumeOffset => Characteristic::VolumeOffsetControlPoint,
        }
    }

    /// The state characteristic of this service, carrying the change counter
    pub fn state(&self) -> Characteristic {
        match self {
            Service::AudioInputControl => Characteristic::AudioInputState,
            Service::VolumeControl => Characteristic::VolumeState,
            Service::VolumeOffset => Characteristic::VolumeOffsetState,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Characteristics of the three services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Characteristic {
    VolumeState,
    VolumeControlPoint,
    VolumeFlags,

    VolumeOffsetState,
    AudioLocation,
    VolumeOffsetControlPoint,
    AudioOutputDescription,

    AudioInputState,
    GainSettingProperties,
    AudioInputType,
    AudioInputStatus,
    AudioInputControlPoint,
    AudioInputDescription,
}

impl Characteristic {
    pub fn name(&self) -> &'static str {
        match self {
            Characteristic::VolumeState => "VolumeState",
            Characteristic::VolumeControlPoint => "VolumeControlPoint",
            Characteristic::VolumeFlags => "VolumeFlags",
            Characteristic::VolumeOffsetState => "VolumeOffsetState",
            Characteristic::AudioLocation => "AudioLocation",
            Characteristic::VolumeOffsetControlPoint => "VolumeOffsetControlPoint",
            Characteristic::AudioOutputDescription => "AudioOutputDescription",
            Characteristic::AudioInputState => "AudioInputState",
            Characteristic::GainSettingProperties => "GainSettingProperties",
            Characteristic::AudioInputType => "AudioInputType",
            Characteristic::AudioInputStatus => "AudioInputStatus",
            Characteristic::AudioInputControlPoint => "AudioInputControlPoint",
            Characteristic::AudioInputDescription => "AudioInputDescription",
        }
    }

    /// 16-bit SIG-assigned UUID of the characteristic
    pub fn uuid16(&self) -> u16 {
        match self {
            Characteristic::VolumeState => 0x2B7D,
            Characteristic::VolumeControlPoint => 0x2B7E,
            Characteristic::VolumeFlags => 0x2B7F,
            Characteristic::VolumeOffsetState => 0x2B80,
            Characteristic::AudioLocation => 0x2B81,
            Characteristic::VolumeOffsetControlPoint => 0x2B82,
            Characteristic::AudioOutputDescription => 0x2B83,
            Characteristic::AudioInputState => 0x2B77,
            Characteristic::GainSettingProperties => 0x2B78,
            Characteristic::AudioInputType => 0x2B79,
            Characteristic::AudioInputStatus => 0x2B7A,
            Characteristic::AudioInputControlPoint => 0x2B7B,
            Characteristic::AudioInputDescription => 0x2B7C,
        }
    }

    /// Full 128-bit UUID string of the characteristic
    pub fn uuid(&self) -> String {
        expand_uuid16(self.uuid16())
    }

    /// The service that owns this characteristic
    pub fn service(&self) -> Service {
        match self {
            Characteristic::VolumeState
            | Characteristic::VolumeControlPoint
            | Characteristic::VolumeFlags => Service::VolumeControl,
            Characteristic::VolumeOffsetState
            | Characteristic::AudioLocation
            | Characteristic::VolumeOffsetControlPoint
            | Characteristic::AudioOutputDescription => Service::VolumeOffset,
            Characteristic::AudioInputState
            | Characteristic::GainSettingProperties
            | Characteristic::AudioInputType
            | Characteristic::AudioInputStatus
            | Characteristic::AudioInputControlPoint
            | Characteristic::AudioInputDescription => Service::AudioInputControl,
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expand a 16-bit SIG UUID onto the Bluetooth base UUID
pub fn expand_uuid16(uuid: u16) -> String {
    format!("0000{:04X}-{}", uuid, BASE_UUID_SUFFIX)
}
