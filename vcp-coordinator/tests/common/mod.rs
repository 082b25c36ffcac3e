//! Test helpers for coordinator integration tests
//!
//! - A recording [`GattClient`] that keeps every request it is handed
//! - Device mirrors with a fixed handle layout
//! - A harness that owns a coordinator plus its event and expiry channels

#![allow(dead_code)]

use std::sync::{mpsc, Arc};

use parking_lot::Mutex;
use tokio::sync::mpsc as tokio_mpsc;

use vcp_coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, DeviceId, DeviceMirror, GattClient,
    GattError, GattEvent, GroupId, GroupRoutingTable, OperationId, OperationResult,
    TimeoutSupervisor,
};
use vcp_state::{
    AudioInputHandles, Handle, VolumeControlHandles, VolumeControlState, VolumeOffsetHandles,
};

pub const VOLUME_STATE: Handle = 0x12;
pub const VOLUME_CP: Handle = 0x15;
pub const VOLUME_FLAGS: Handle = 0x17;
pub const OFFSET_STATE: Handle = 0x32;
pub const OFFSET_LOCATION: Handle = 0x35;
pub const OFFSET_CP: Handle = 0x3B;
pub const INPUT_STATE: Handle = 0x52;
pub const INPUT_STATUS: Handle = 0x58;
pub const INPUT_CP: Handle = 0x5C;

/// A request handed to the GATT layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattRequest {
    Write {
        device: DeviceId,
        handle: Handle,
        value: Vec<u8>,
        op: OperationId,
    },
    WriteWithoutResponse {
        device: DeviceId,
        handle: Handle,
        value: Vec<u8>,
    },
    Read {
        device: DeviceId,
        handle: Handle,
        op: Option<OperationId>,
    },
    Subscribe {
        device: DeviceId,
        handle: Handle,
    },
}

/// GATT client that records requests and never answers on its own
#[derive(Debug, Clone, Default)]
pub struct RecordingGatt {
    requests: Arc<Mutex<Vec<GattRequest>>>,
    failing: Arc<Mutex<Vec<DeviceId>>>,
}

impl RecordingGatt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<GattRequest> {
        self.requests.lock().clone()
    }

    /// Control-point writes issued so far, in order
    pub fn writes(&self) -> Vec<(DeviceId, Handle, Vec<u8>, OperationId)> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| match request {
                GattRequest::Write {
                    device,
                    handle,
                    value,
                    op,
                } => Some((device.clone(), *handle, value.clone(), *op)),
                _ => None,
            })
            .collect()
    }

    pub fn writes_to(&self, device: &DeviceId) -> Vec<Vec<u8>> {
        self.writes()
            .into_iter()
            .filter(|(target, ..)| target == device)
            .map(|(_, _, value, _)| value)
            .collect()
    }

    pub fn reads(&self) -> Vec<(DeviceId, Handle, Option<OperationId>)> {
        self.requests
            .lock()
            .iter()
            .filter_map(|request| match request {
                GattRequest::Read { device, handle, op } => Some((device.clone(), *handle, *op)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }

    /// Make every request to `device` fail to issue
    pub fn fail_device(&self, device: DeviceId) {
        self.failing.lock().push(device);
    }

    fn record(&self, device: &DeviceId, request: GattRequest) -> Result<(), GattError> {
        if self.failing.lock().contains(device) {
            return Err(GattError::NotConnected(device.clone()));
        }
        self.requests.lock().push(request);
        Ok(())
    }
}

impl GattClient for RecordingGatt {
    fn write_control_point(
        &self,
        device: &DeviceId,
        handle: Handle,
        value: &[u8],
        op: OperationId,
    ) -> Result<(), GattError> {
        self.record(
            device,
            GattRequest::Write {
                device: device.clone(),
                handle,
                value: value.to_vec(),
                op,
            },
        )
    }

    fn write_without_response(
        &self,
        device: &DeviceId,
        handle: Handle,
        value: &[u8],
    ) -> Result<(), GattError> {
        self.record(
            device,
            GattRequest::WriteWithoutResponse {
                device: device.clone(),
                handle,
                value: value.to_vec(),
            },
        )
    }

    fn read_characteristic(
        &self,
        device: &DeviceId,
        handle: Handle,
        op: Option<OperationId>,
    ) -> Result<(), GattError> {
        self.record(
            device,
            GattRequest::Read {
                device: device.clone(),
                handle,
                op,
            },
        )
    }

    fn subscribe_notifications(&self, device: &DeviceId, handle: Handle) -> Result<(), GattError> {
        self.record(
            device,
            GattRequest::Subscribe {
                device: device.clone(),
                handle,
            },
        )
    }
}

pub fn device(n: u8) -> DeviceId {
    DeviceId::new(format!("aa:bb:cc:dd:ee:{:02x}", n))
}

/// Mirror with a Volume Control Service, one offset and one input
pub fn mirror(n: u8, volume: u8, mute: bool, counter: u8) -> DeviceMirror {
    let mut state = VolumeControlState::new(VolumeControlHandles {
        service: 0x10,
        state: VOLUME_STATE,
        state_ccc: 0x13,
        control_point: VOLUME_CP,
        flags: VOLUME_FLAGS,
        flags_ccc: 0x18,
    });
    state.volume = volume;
    state.mute = mute;
    state.change_counter = counter;

    let mut mirror = DeviceMirror::new(device(n), state);
    mirror
        .offsets
        .add(VolumeOffsetHandles {
            service: 0x30,
            state: OFFSET_STATE,
            state_ccc: 0x33,
            location: OFFSET_LOCATION,
            location_ccc: 0x36,
            description: 0x38,
            description_ccc: 0x39,
            control_point: OFFSET_CP,
        })
        .expect("offset handles");
    mirror
        .inputs
        .add(AudioInputHandles {
            service: 0x50,
            state: INPUT_STATE,
            state_ccc: 0x53,
            gain_setting: 0x55,
            input_type: 0x57,
            status: INPUT_STATUS,
            status_ccc: 0x59,
            control_point: INPUT_CP,
            description: 0x5E,
            description_ccc: 0x5F,
        })
        .expect("input handles");
    mirror
}

/// A coordinator driven directly from the test, without the worker thread
pub struct Harness {
    pub coordinator: Coordinator<RecordingGatt, GroupRoutingTable>,
    pub gatt: RecordingGatt,
    events: mpsc::Receiver<CoordinatorEvent>,
    expiry: tokio_mpsc::UnboundedReceiver<OperationId>,
}

impl Harness {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_groups(config, GroupRoutingTable::new())
    }

    pub fn with_groups(config: CoordinatorConfig, groups: GroupRoutingTable) -> Self {
        let gatt = RecordingGatt::new();
        let (event_tx, events) = mpsc::channel();
        let (expiry_tx, expiry) = tokio_mpsc::unbounded_channel();
        let coordinator = Coordinator::new(
            config,
            gatt.clone(),
            groups,
            TimeoutSupervisor::new(expiry_tx),
            event_tx,
        );
        Self {
            coordinator,
            gatt,
            events,
            expiry,
        }
    }

    /// Harness with devices 1..=n registered as members of group 1
    pub fn group(config: CoordinatorConfig, members: &[(u8, u8, bool, u8)]) -> Self {
        let mut table = GroupRoutingTable::new();
        for (n, ..) in members {
            table.add_member(GroupId::new(1), device(*n));
        }
        let mut harness = Self::with_groups(config, table);
        for (n, volume, mute, counter) in members {
            harness.add(mirror(*n, *volume, *mute, *counter));
        }
        harness
    }

    pub fn add(&mut self, mirror: DeviceMirror) {
        self.coordinator.add_device(mirror).expect("add device");
        self.gatt.clear();
        self.drain();
    }

    pub fn write_response(&mut self, n: u8, op: OperationId, status: &[u8]) {
        self.coordinator.handle_gatt_event(GattEvent::WriteComplete {
            device: device(n),
            op,
            status: status.to_vec(),
        });
    }

    pub fn notify(&mut self, n: u8, handle: Handle, value: &[u8]) {
        self.coordinator.handle_gatt_event(GattEvent::Notification {
            device: device(n),
            handle,
            value: value.to_vec(),
        });
    }

    pub fn notify_volume(&mut self, n: u8, volume: u8, mute: bool, counter: u8) {
        self.notify(n, VOLUME_STATE, &[volume, mute as u8, counter]);
    }

    pub fn read_response(&mut self, n: u8, handle: Handle, value: &[u8], op: Option<OperationId>) {
        self.coordinator.handle_gatt_event(GattEvent::ReadComplete {
            device: device(n),
            handle,
            result: Ok(value.to_vec()),
            op,
        });
    }

    pub fn disconnect(&mut self, n: u8) {
        self.coordinator
            .handle_gatt_event(GattEvent::Disconnected { device: device(n) });
    }

    /// Wait for the next deadline and hand it to the coordinator
    pub async fn next_expiry(&mut self) -> OperationId {
        let id = self.expiry.recv().await.expect("expiry channel open");
        self.coordinator.on_timer_expired(id);
        id
    }

    pub fn drain(&mut self) -> Vec<CoordinatorEvent> {
        self.events.try_iter().collect()
    }

    pub fn completions(&mut self) -> Vec<OperationResult> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                CoordinatorEvent::OperationCompleted(result) => Some(result),
                _ => None,
            })
            .collect()
    }
}
