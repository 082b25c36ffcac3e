//! Wire API for the Bluetooth LE Volume Control Profile
//!
//! This crate covers everything that is decided by the bytes on the air:
//! service and characteristic identifiers, control-point opcodes, the
//! change-counter write convention and the decoders for the values peers
//! report. It holds no state and performs no I/O.
//!
//! ```rust
//! use vcp_api::{decode_response, ControlCommand, ControlPointResponse, Service, VolumeCommand};
//!
//! let command = ControlCommand::Volume(VolumeCommand::SetAbsoluteVolume(40));
//! assert_eq!(command.encode(5)?, vec![0x04, 0x05, 40]);
//!
//! assert_eq!(
//!     decode_response(Service::VolumeControl, &[0x80]),
//!     ControlPointResponse::CounterMismatch
//! );
//! # Ok::<(), vcp_api::ApiError>(())
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod opcode;
pub mod service;
pub mod values;

pub use codec::{decode_response, encode, ControlPointResponse, RejectReason};
pub use command::{
    ControlCommand, InputCommand, InstanceRef, OffsetCommand, Validate, ValidationError,
    VolumeCommand,
};
pub use error::{ApiError, Result};
pub use opcode::{InputOpcode, OffsetOpcode, VolumeOpcode};
pub use service::{Characteristic, Service};
pub use values::{
    decode_description, AudioInputState, AudioLocation, GainMode, GainSettings, InputMute,
    InputStatus, InputType, OffsetState, VolumeFlags, VolumeState,
};
