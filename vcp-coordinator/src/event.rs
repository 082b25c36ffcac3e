//! Events reported to the host

use vcp_api::{AudioLocation, GainSettings, InputStatus, InputType, InstanceRef, VolumeFlags};
use vcp_state::{DeviceId, InstanceState, MirrorUpdate};

use crate::operation::{OperationId, OperationResult};

/// Everything the coordinator reports upward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// An operation finished; carries one outcome per target device
    OperationCompleted(OperationResult),

    /// A peer changed state on its own
    AutonomousUpdate {
        device: DeviceId,
        instance: InstanceRef,
        state: InstanceState,
        operation: OperationId,
    },

    /// Mirror refreshed from a read or a notification confirming a host write
    StateRefreshed {
        device: DeviceId,
        instance: InstanceRef,
        state: InstanceState,
    },

    DeviceAvailable {
        device: DeviceId,
        outputs: usize,
        inputs: usize,
    },

    DeviceRemoved {
        device: DeviceId,
    },

    VolumeFlagsChanged {
        device: DeviceId,
        flags: VolumeFlags,
    },

    OffsetLocationChanged {
        device: DeviceId,
        offset_id: u8,
        location: AudioLocation,
    },

    OffsetDescriptionChanged {
        device: DeviceId,
        offset_id: u8,
        description: String,
    },

    InputStatusChanged {
        device: DeviceId,
        input_id: u8,
        status: InputStatus,
    },

    InputTypeChanged {
        device: DeviceId,
        input_id: u8,
        input_type: InputType,
    },

    InputDescriptionChanged {
        device: DeviceId,
        input_id: u8,
        description: String,
    },

    GainPropertiesChanged {
        device: DeviceId,
        input_id: u8,
        settings: GainSettings,
    },
}

impl CoordinatorEvent {
    /// Event for a mirror update that is not a state change
    ///
    /// State changes carry attribution and are reported by the coordinator
    /// itself, so they map to `None` here.
    pub(crate) fn from_mirror_update(device: DeviceId, update: MirrorUpdate) -> Option<Self> {
        let event = match update {
            MirrorUpdate::VolumeFlags(flags) => CoordinatorEvent::VolumeFlagsChanged { device, flags },
            MirrorUpdate::OffsetLocation { offset_id, location } => {
                CoordinatorEvent::OffsetLocationChanged {
                    device,
                    offset_id,
                    location,
                }
            }
            MirrorUpdate::OffsetDescription {
                offset_id,
                description,
            } => CoordinatorEvent::OffsetDescriptionChanged {
                device,
                offset_id,
                description,
            },
            MirrorUpdate::InputStatus { input_id, status } => CoordinatorEvent::InputStatusChanged {
                device,
                input_id,
                status,
            },
            MirrorUpdate::InputType {
                input_id,
                input_type,
            } => CoordinatorEvent::InputTypeChanged {
                device,
                input_id,
                input_type,
            },
            MirrorUpdate::InputDescription {
                input_id,
                description,
            } => CoordinatorEvent::InputDescriptionChanged {
                device,
                input_id,
                description,
            },
            MirrorUpdate::GainSettings { input_id, settings } => {
                CoordinatorEvent::GainPropertiesChanged {
                    device,
                    input_id,
                    settings,
                }
            }
            MirrorUpdate::State { .. } | MirrorUpdate::Ignored => return None,
        };
        Some(event)
    }

    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            CoordinatorEvent::OperationCompleted(_) => None,
            CoordinatorEvent::AutonomousUpdate { device, .. }
            | CoordinatorEvent::StateRefreshed { device, .. }
            | CoordinatorEvent::DeviceAvailable { device, .. }
            | CoordinatorEvent::DeviceRemoved { device }
            | CoordinatorEvent::VolumeFlagsChanged { device, .. }
            | CoordinatorEvent::OffsetLocationChanged { device, .. }
            | CoordinatorEvent::OffsetDescriptionChanged { device, .. }
            | CoordinatorEvent::InputStatusChanged { device, .. }
            | CoordinatorEvent::InputTypeChanged { device, .. }
            | CoordinatorEvent::InputDescriptionChanged { device, .. }
            | CoordinatorEvent::GainPropertiesChanged { device, .. } => Some(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_updates_are_not_mapped() {
        let device = DeviceId::new("aa:bb:cc:dd:ee:01");
        assert!(CoordinatorEvent::from_mirror_update(device.clone(), MirrorUpdate::Ignored).is_none());

        let event = CoordinatorEvent::from_mirror_update(
            device.clone(),
            MirrorUpdate::InputStatus {
                input_id: 2,
                status: InputStatus::Active,
            },
        )
        .unwrap();
        assert_eq!(event.device(), Some(&device));
        assert!(matches!(
            event,
            CoordinatorEvent::InputStatusChanged { input_id: 2, .. }
        ));
    }
}
