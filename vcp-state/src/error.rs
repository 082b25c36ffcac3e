//! Error types for vcp-state

use thiserror::Error;
use vcp_api::ApiError;

/// Result type for vcp-state operations
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur while reading or updating a device mirror
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No audio input with this id on the device
    #[error("Unknown audio input id {0}")]
    UnknownInput(u8),

    /// No volume offset with this id on the device
    #[error("Unknown volume offset id {0}")]
    UnknownOffset(u8),

    /// Handle does not belong to any mirrored characteristic
    #[error("Unknown attribute handle 0x{0:04x}")]
    UnknownHandle(u16),

    /// Gain outside the bounds advertised by the input's gain settings
    #[error("Gain {gain} outside of [{min}, {max}]")]
    GainOutOfRange { gain: i8, min: i8, max: i8 },

    /// The peer does not allow the host to write this characteristic
    #[error("{0} is not writable on this device")]
    NotWritable(&'static str),

    /// Ids are a single byte; a device cannot expose more instances
    #[error("Too many {0} instances")]
    TooManyInstances(&'static str),

    /// Value decoding failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcp_api::Service;

    #[test]
    fn test_error_display() {
        let err = StateError::GainOutOfRange {
            gain: 30,
            min: -10,
            max: 20,
        };
        assert_eq!(err.to_string(), "Gain 30 outside of [-10, 20]");
        assert_eq!(
            StateError::UnknownHandle(0x2a).to_string(),
            "Unknown attribute handle 0x002a"
        );
    }

    #[test]
    fn test_api_error_conversion() {
        let api = ApiError::UnsupportedOpcode {
            service: Service::VolumeControl,
            opcode: 9,
        };
        let err: StateError = api.clone().into();
        assert_eq!(err, StateError::Api(api));
    }
}
