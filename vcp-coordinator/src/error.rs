use thiserror::Error;

use vcp_api::{ApiError, InstanceRef};
use vcp_state::{DeviceId, GroupId, StateError};

/// Errors reported by the GATT collaborator when a request cannot be issued
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    /// The link to the device is gone
    #[error("Device {0} is not connected")]
    NotConnected(DeviceId),

    /// The transport refused to queue another request
    #[error("GATT queue is full")]
    Busy,

    /// Any other transport failure
    #[error("GATT request failed: {0}")]
    Failed(String),
}

/// Errors that can occur in the coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Target device is not connected or a group resolved to nobody
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Group has no members
    #[error("Unknown group {0}")]
    UnknownGroup(GroupId),

    /// Device does not expose the addressed service instance
    #[error("Device {device} has no {instance}")]
    UnknownInstance {
        device: DeviceId,
        instance: InstanceRef,
    },

    /// Command failed validation or encoding
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Mirror lookup or update failed
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// GATT request could not be issued
    #[error("GATT error: {0}")]
    Gatt(#[from] GattError),

    /// The dispatch worker has shut down
    #[error("Dispatch worker is no longer running")]
    WorkerDisconnected,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<vcp_api::ValidationError> for CoordinatorError {
    fn from(error: vcp_api::ValidationError) -> Self {
        CoordinatorError::Api(error.into())
    }
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
