//! GATT collaborator seam
//!
//! The coordinator never blocks on the air. Requests are issued through
//! [`GattClient`] and their results come back later as [`GattEvent`]s fed
//! into the dispatch loop, tagged with the operation that caused them.

use vcp_state::{DeviceId, Handle};

use crate::error::GattError;
use crate::operation::OperationId;

/// Outbound GATT requests
///
/// Implementations queue the request and return immediately. An `Err` means
/// the request was never issued; failures after issue are reported through
/// the corresponding [`GattEvent`].
#[cfg_attr(test, mockall::automock)]
pub trait GattClient: Send {
    /// Write with response to a control point; completion arrives as
    /// [`GattEvent::WriteComplete`] carrying `op`
    fn write_control_point(
        &self,
        device: &DeviceId,
        handle: Handle,
        value: &[u8],
        op: OperationId,
    ) -> Result<(), GattError>;

    /// Write without response (audio location, descriptions)
    fn write_without_response(
        &self,
        device: &DeviceId,
        handle: Handle,
        value: &[u8],
    ) -> Result<(), GattError>;

    /// Read a characteristic; completion arrives as [`GattEvent::ReadComplete`]
    fn read_characteristic(
        &self,
        device: &DeviceId,
        handle: Handle,
        op: Option<OperationId>,
    ) -> Result<(), GattError>;

    /// Enable notifications on a characteristic value handle
    fn subscribe_notifications(&self, device: &DeviceId, handle: Handle) -> Result<(), GattError>;
}

/// Results and unsolicited traffic from the GATT layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    /// Write response to a control-point write; `status` is the raw ATT or
    /// application status, empty on success
    WriteComplete {
        device: DeviceId,
        op: OperationId,
        status: Vec<u8>,
    },
    ReadComplete {
        device: DeviceId,
        handle: Handle,
        result: Result<Vec<u8>, GattError>,
        op: Option<OperationId>,
    },
    Notification {
        device: DeviceId,
        handle: Handle,
        value: Vec<u8>,
    },
    Disconnected {
        device: DeviceId,
    },
}

impl GattEvent {
    pub fn device(&self) -> &DeviceId {
        match self {
            GattEvent::WriteComplete { device, .. }
            | GattEvent::ReadComplete { device, .. }
            | GattEvent::Notification { device, .. }
            | GattEvent::Disconnected { device } => device,
        }
    }
}
