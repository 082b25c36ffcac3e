//! Device State Mirror for the Volume Control Profile
//!
//! Holds what the host currently knows about each connected peer: its
//! Volume Control state, its volume offsets (one per audio output) and its
//! audio inputs, together with the attribute handles discovered for each.
//!
//! # Architecture
//!
//! ```text
//! GATT reads / notifications → DeviceMirror::apply_value → MirrorUpdate
//!                                   │
//!                   VolumeControlState, VolumeOffsets, VolumeAudioInputs
//! ```
//!
//! Handles are populated by the caller after service discovery; the mirror
//! never talks to the peer itself.
//!
//! ```rust
//! use vcp_state::{DeviceId, DeviceMirror, VolumeControlHandles, VolumeControlState};
//! use vcp_api::InstanceRef;
//!
//! let handles = VolumeControlHandles { state: 0x12, state_ccc: 0x13, control_point: 0x15, ..Default::default() };
//! let mut mirror = DeviceMirror::new(DeviceId::new("aa:bb:cc:dd:ee:ff"), VolumeControlState::new(handles));
//!
//! mirror.apply_value(0x12, &[40, 0, 6])?;
//! assert_eq!(mirror.change_counter(InstanceRef::Volume), Some(6));
//! # Ok::<(), vcp_state::StateError>(())
//! ```

pub mod error;
pub mod input;
pub mod logging;
pub mod mirror;
pub mod model;
pub mod offset;
pub mod volume;

/// ATT attribute handle; 0 marks an attribute that was not discovered
pub type Handle = u16;

pub use error::{Result, StateError};
pub use input::{AudioInputHandles, VolumeAudioInput, VolumeAudioInputs};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use mirror::{DeviceMirror, InstanceState, MirrorUpdate};
pub use model::{DeviceId, GroupId};
pub use offset::{VolumeOffset, VolumeOffsetHandles, VolumeOffsets};
pub use volume::{VolumeControlHandles, VolumeControlState};

// Re-export the wire types the mirror is expressed in
pub use vcp_api::{InstanceRef, Service};
