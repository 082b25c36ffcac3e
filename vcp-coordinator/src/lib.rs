//! # Volume Control Coordinator
//!
//! Group-aware volume coordination for Bluetooth LE Audio devices exposing
//! the Volume Control, Volume Offset Control and Audio Input Control
//! services.
//!
//! ## Overview
//!
//! A single logical request ("set the group to 40") becomes one write per
//! connected member, each carrying that member's last-known change counter.
//! The coordinator tracks every such operation until each target has
//! confirmed, failed, disconnected or run out of time, and reports exactly
//! one completion per operation. State changes that a peer makes on its own
//! are tracked as separate autonomous operations and, for group members,
//! mirrored to the rest of the group.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vcp_coordinator::{CoordinatorEvent, GroupRoutingTable, VolumeControlManager};
//!
//! let groups = GroupRoutingTable::shared();
//! let manager = VolumeControlManager::new(my_gatt_client, groups.clone())?;
//! let sink = manager.gatt_sink();
//!
//! manager.add_device(mirror_from_discovery)?;
//! groups.write().add_member(group, device.clone());
//!
//! let op = manager.set_volume(group, 40)?;
//! for event in manager.iter() {
//!     if let CoordinatorEvent::OperationCompleted(result) = event {
//!         println!("{} finished: {:?}", result.id, result.outcomes);
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! host ──► VolumeControlManager ──► dispatch worker ──► Coordinator ──► GattClient
//!                                        ▲                  │
//! BT stack ──► GattEventSink ────────────┘                  └──► EventIterator
//! ```
//!
//! The [`Coordinator`] is a plain `&mut self` state machine; the worker
//! thread owns it together with the deadline timers, so every input is
//! processed to completion before the next is looked at.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod gatt;
mod group;
pub mod groups;
pub mod iter;
pub mod manager;
pub mod operation;
pub mod session;
pub mod timeout;
pub mod tracker;
pub mod worker;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::{CoordinatorError, GattError, Result};
pub use event::CoordinatorEvent;
pub use gatt::{GattClient, GattEvent};
pub use groups::{GroupMembership, GroupRoutingTable, SharedGroups};
pub use iter::{EventIterator, Events};
pub use manager::{GattEventSink, VolumeControlManager};
pub use operation::{
    AutonomousChange, CancelReason, CompletionStatus, DeviceOutcome, FailureReason, OperationId,
    OperationKind, OperationResult, OperationStatus, SlotState, Target,
};
pub use session::DeviceSession;
pub use timeout::{SupervisorStats, TimeoutSupervisor};
pub use tracker::OperationTracker;

// Re-export commonly used types from dependencies
pub use vcp_api::{ControlCommand, InputCommand, InstanceRef, OffsetCommand, VolumeCommand};
pub use vcp_state::{DeviceId, DeviceMirror, GroupId};

/// Prelude module for convenient imports
///
/// ```rust
/// use vcp_coordinator::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ControlCommand, CoordinatorConfig, CoordinatorError, CoordinatorEvent, DeviceId,
        DeviceMirror, EventIterator, GattClient, GattEvent, GroupId, GroupRoutingTable, Result,
        Target, VolumeCommand, VolumeControlManager,
    };
}
