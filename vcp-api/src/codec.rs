//! Change-counter control-point codec
//!
//! Every control-point write carries the change counter the client last saw
//! for the addressed instance: `[opcode, change_counter, args...]`. The peer
//! rejects the write with "invalid change counter" when its counter has
//! moved on, which is how concurrent changes are detected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ApiError, Result};
use crate::opcode::argument_len;
use crate::service::Service;

/// Application error: the written change counter does not match the peer's
pub const ERROR_INVALID_CHANGE_COUNTER: u8 = 0x80;
/// Application error: opcode not supported by the peer
pub const ERROR_OPCODE_NOT_SUPPORTED: u8 = 0x81;

/// Build a control-point write for `service`
///
/// Fails with [`ApiError::UnsupportedOpcode`] for opcodes outside the
/// service's recognized set and with [`ApiError::InvalidParameter`] when the
/// argument length does not match what the opcode takes.
pub fn encode(service: Service, opcode: u8, args: &[u8], change_counter: u8) -> Result<Vec<u8>> {
    let expected = argument_len(service, opcode)?;
    if args.len() != expected {
        return Err(ApiError::InvalidParameter(format!(
            "{} opcode 0x{:02x} takes {} argument bytes, got {}",
            service,
            opcode,
            expected,
            args.len()
        )));
    }

    let mut bytes = Vec::with_capacity(2 + args.len());
    bytes.push(opcode);
    bytes.push(change_counter);
    bytes.extend_from_slice(args);
    Ok(bytes)
}

/// Why a peer refused a control-point write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    OpcodeNotSupported,
    /// AICS: the input's mute is disabled and cannot be changed
    MuteDisabled,
    ValueOutOfRange,
    /// AICS: the input's gain mode is fixed
    GainModeChangeNotAllowed,
    /// Any other application or ATT error code, kept verbatim
    Other(u8),
}

impl RejectReason {
    /// Interpret a peer error code in the context of `service`
    ///
    /// Error codes from 0x82 on are assigned per service.
    pub fn from_code(service: Service, code: u8) -> Self {
        match (service, code) {
            (_, ERROR_OPCODE_NOT_SUPPORTED) => RejectReason::OpcodeNotSupported,
            (Service::VolumeOffset, 0x82) => RejectReason::ValueOutOfRange,
            (Service::AudioInputControl, 0x82) => RejectReason::MuteDisabled,
            (Service::AudioInputControl, 0x83) => RejectReason::ValueOutOfRange,
            (Service::AudioInputControl, 0x84) => RejectReason::GainModeChangeNotAllowed,
            (_, code) => RejectReason::Other(code),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::OpcodeNotSupported => write!(f, "opcode not supported"),
            RejectReason::MuteDisabled => write!(f, "mute disabled"),
            RejectReason::ValueOutOfRange => write!(f, "value out of range"),
            RejectReason::GainModeChangeNotAllowed => write!(f, "gain mode change not allowed"),
            RejectReason::Other(code) => write!(f, "error 0x{:02x}", code),
        }
    }
}

/// Outcome of a control-point write as reported by the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlPointResponse {
    Accepted,
    Rejected(RejectReason),
    /// The peer's counter advanced between our read and our write
    CounterMismatch,
}

/// Decode the write-response status of a control-point write
///
/// An empty status or `0x00` means the write was accepted.
pub fn decode_response(service: Service, status: &[u8]) -> ControlPointResponse {
    match status.first().copied() {
        None | Some(0x00) => ControlPointResponse::Accepted,
        Some(ERROR_INVALID_CHANGE_COUNTER) => ControlPointResponse::CounterMismatch,
        Some(code) => ControlPointResponse::Rejected(RejectReason::from_code(service, code)),
    }
}
