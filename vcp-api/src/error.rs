use thiserror::Error;

use crate::service::{Characteristic, Service};

/// Errors produced while encoding commands or decoding peer payloads
///
/// These are raised before anything reaches the air (encode side) or while
/// turning raw attribute values back into typed state (decode side). They
/// never describe a peer-reported failure; those surface as
/// [`ControlPointResponse::Rejected`](crate::ControlPointResponse::Rejected).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Opcode is not part of the service's control-point opcode set
    ///
    /// This is a programmer error and is rejected before dispatch.
    #[error("Unsupported opcode 0x{opcode:02x} for {service}")]
    UnsupportedOpcode { service: Service, opcode: u8 },

    /// Invalid parameter value
    ///
    /// Covers argument length mismatches and out-of-range values.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Attribute value could not be decoded
    #[error("Failed to decode {characteristic}: {reason}")]
    Decode {
        characteristic: Characteristic,
        reason: String,
    },
}

impl ApiError {
    pub(crate) fn decode(characteristic: Characteristic, reason: impl Into<String>) -> Self {
        Self::Decode {
            characteristic,
            reason: reason.into(),
        }
    }

    pub(crate) fn truncated(characteristic: Characteristic, expected: usize, actual: usize) -> Self {
        Self::decode(
            characteristic,
            format!("expected {} bytes, got {}", expected, actual),
        )
    }
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

/// Convert from ValidationError to ApiError
impl From<crate::command::ValidationError> for ApiError {
    fn from(validation_error: crate::command::ValidationError) -> Self {
        match validation_error {
            crate::command::ValidationError::RangeError { parameter, value, min, max } => {
                ApiError::InvalidParameter(format!(
                    "Parameter '{}' value {} is out of range [{}, {}]",
                    parameter, value, min, max
                ))
            }
            crate::command::ValidationError::InvalidValue { parameter, value, reason } => {
                ApiError::InvalidParameter(format!(
                    "Invalid value '{}' for parameter '{}': {}",
                    value, parameter, reason
                ))
            }
        }
    }
}
