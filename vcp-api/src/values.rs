//! Characteristic value decoders
//!
//! Peers report state through reads and notifications of the services'
//! characteristics. These types are the decoded form of those values; all
//! multi-byte fields are little-endian.

use bytes::Buf;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::service::Characteristic;

fn ensure_len(characteristic: Characteristic, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(ApiError::truncated(characteristic, expected, data.len()));
    }
    Ok(())
}

/// Volume State characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeState {
    pub volume: u8,
    pub mute: bool,
    pub change_counter: u8,
}

impl VolumeState {
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::VolumeState, data, 3)?;
        Ok(Self {
            volume: data.get_u8(),
            mute: data.get_u8() != 0,
            change_counter: data.get_u8(),
        })
    }
}

/// Volume Flags characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeFlags(pub u8);

impl VolumeFlags {
    const VOLUME_SETTING_PERSISTED: u8 = 0x01;

    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::VolumeFlags, data, 1)?;
        Ok(Self(data[0]))
    }

    /// Whether the peer restored a persisted volume rather than its default
    pub fn volume_setting_persisted(&self) -> bool {
        self.0 & Self::VOLUME_SETTING_PERSISTED != 0
    }
}

/// Volume Offset State characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffsetState {
    pub offset: i16,
    pub change_counter: u8,
}

impl OffsetState {
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::VolumeOffsetState, data, 3)?;
        Ok(Self {
            offset: data.get_i16_le(),
            change_counter: data.get_u8(),
        })
    }
}

/// Audio Location bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AudioLocation(pub u32);

impl AudioLocation {
    pub const NOT_ALLOWED: AudioLocation = AudioLocation(0x0000_0000);
    pub const FRONT_LEFT: AudioLocation = AudioLocation(0x0000_0001);
    pub const FRONT_RIGHT: AudioLocation = AudioLocation(0x0000_0002);
    pub const FRONT_CENTER: AudioLocation = AudioLocation(0x0000_0004);

    pub fn decode(mut data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::AudioLocation, data, 4)?;
        Ok(Self(data.get_u32_le()))
    }

    pub fn encode(&self) -> Vec<u8> {
        self.0.to_le_bytes().to_vec()
    }

    pub fn contains(&self, other: AudioLocation) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

/// Gain mode of an audio input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GainMode {
    ManualOnly,
    AutomaticOnly,
    #[default]
    Manual,
    Automatic,
    Other(u8),
}

impl GainMode {
    pub fn as_u8(&self) -> u8 {
        match self {
            GainMode::ManualOnly => 0,
            GainMode::AutomaticOnly => 1,
            GainMode::Manual => 2,
            GainMode::Automatic => 3,
            GainMode::Other(raw) => *raw,
        }
    }

    /// Whether the host may switch between manual and automatic gain
    pub fn is_switchable(&self) -> bool {
        !matches!(self, GainMode::ManualOnly | GainMode::AutomaticOnly)
    }
}

impl From<u8> for GainMode {
    fn from(value: u8) -> Self {
        match value {
            0 => GainMode::ManualOnly,
            1 => GainMode::AutomaticOnly,
            2 => GainMode::Manual,
            3 => GainMode::Automatic,
            other => GainMode::Other(other),
        }
    }
}

/// Mute field of the Audio Input State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputMute {
    #[default]
    NotMuted,
    Muted,
    /// The peer does not allow the input to be muted
    Disabled,
}

impl InputMute {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(InputMute::NotMuted),
            1 => Ok(InputMute::Muted),
            2 => Ok(InputMute::Disabled),
            other => Err(ApiError::decode(
                Characteristic::AudioInputState,
                format!("invalid mute value {}", other),
            )),
        }
    }
}

/// Audio Input State characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioInputState {
    pub gain: i8,
    pub mute: InputMute,
    pub gain_mode: GainMode,
    pub change_counter: u8,
}

impl AudioInputState {
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::AudioInputState, data, 4)?;
        Ok(Self {
            gain: data.get_i8(),
            mute: InputMute::from_u8(data.get_u8())?,
            gain_mode: GainMode::from(data.get_u8()),
            change_counter: data.get_u8(),
        })
    }
}

/// Gain Setting Properties: the step unit and bounds of an input's gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GainSettings {
    /// Step size of one gain unit, in 0.1 dB
    pub unit: u8,
    pub min: i8,
    pub max: i8,
}

impl GainSettings {
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::GainSettingProperties, data, 3)?;
        let settings = Self {
            unit: data.get_u8(),
            min: data.get_i8(),
            max: data.get_i8(),
        };
        if settings.min > settings.max {
            return Err(ApiError::decode(
                Characteristic::GainSettingProperties,
                format!("minimum {} above maximum {}", settings.min, settings.max),
            ));
        }
        Ok(settings)
    }

    /// Settings are unknown until the peer reported them
    pub fn is_known(&self) -> bool {
        *self != GainSettings::default()
    }

    pub fn contains(&self, gain: i8) -> bool {
        (self.min..=self.max).contains(&gain)
    }
}

/// Audio Input Type characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputType {
    #[default]
    Unspecified,
    Bluetooth,
    Microphone,
    Analog,
    Digital,
    Radio,
    Streaming,
    Ambient,
}

impl InputType {
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::AudioInputType, data, 1)?;
        Self::try_from(data[0])
    }
}

impl TryFrom<u8> for InputType {
    type Error = ApiError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(InputType::Unspecified),
            0x01 => Ok(InputType::Bluetooth),
            0x02 => Ok(InputType::Microphone),
            0x03 => Ok(InputType::Analog),
            0x04 => Ok(InputType::Digital),
            0x05 => Ok(InputType::Radio),
            0x06 => Ok(InputType::Streaming),
            0x07 => Ok(InputType::Ambient),
            other => Err(ApiError::decode(
                Characteristic::AudioInputType,
                format!("invalid input type 0x{:02x}", other),
            )),
        }
    }
}

/// Audio Input Status characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InputStatus {
    #[default]
    Inactive,
    Active,
}

impl InputStatus {
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(Characteristic::AudioInputStatus, data, 1)?;
        match data[0] {
            0 => Ok(InputStatus::Inactive),
            1 => Ok(InputStatus::Active),
            other => Err(ApiError::decode(
                Characteristic::AudioInputStatus,
                format!("invalid status {}", other),
            )),
        }
    }
}

/// Decode an output or input description
///
/// Descriptions are UTF-8 strings without terminator; invalid sequences are
/// replaced rather than rejected since peers commonly truncate mid-character.
pub fn decode_description(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}
