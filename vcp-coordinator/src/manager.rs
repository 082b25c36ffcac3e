//! Sync-first Volume Control manager
//!
//! Provides a fully synchronous API over the dispatch worker. Every method
//! sends a request to the worker thread and blocks until it answers; the
//! outcomes of the writes themselves arrive later on [`EventIterator`].

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use vcp_api::{AudioLocation, ControlCommand, InputCommand, OffsetCommand, VolumeCommand};
use vcp_state::{DeviceId, DeviceMirror};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::event::CoordinatorEvent;
use crate::gatt::{GattClient, GattEvent};
use crate::groups::GroupMembership;
use crate::iter::EventIterator;
use crate::operation::{OperationId, Target};
use crate::timeout::SupervisorStats;
use crate::worker::{spawn_dispatch_worker, Command};

/// Sync-first handle to the volume coordination engine
///
/// All methods are blocking and must not be called from inside an async
/// runtime.
///
/// # Example
///
/// ```rust,ignore
/// use vcp_coordinator::{GroupRoutingTable, Target, VolumeControlManager};
///
/// let groups = GroupRoutingTable::shared();
/// let manager = VolumeControlManager::new(my_gatt_client, groups.clone())?;
///
/// // Feed GATT results from the Bluetooth stack
/// let sink = manager.gatt_sink();
///
/// manager.add_device(discovered_mirror)?;
/// let op = manager.set_volume(Target::Group(group), 40)?;
///
/// for event in manager.iter() {
///     println!("{:?}", event);
/// }
/// ```
pub struct VolumeControlManager {
    /// Send requests to the dispatch worker
    command_tx: tokio_mpsc::UnboundedSender<Command>,

    /// Receive events from the dispatch worker
    event_rx: Arc<Mutex<mpsc::Receiver<CoordinatorEvent>>>,

    stats: SupervisorStats,

    /// Background worker handle (kept alive)
    _worker: JoinHandle<()>,
}

impl VolumeControlManager {
    /// Create a manager with the default configuration
    pub fn new<G, M>(gatt: G, groups: M) -> Result<Self>
    where
        G: GattClient + 'static,
        M: GroupMembership + 'static,
    {
        Self::with_config(CoordinatorConfig::default(), gatt, groups)
    }

    pub fn with_config<G, M>(config: CoordinatorConfig, gatt: G, groups: M) -> Result<Self>
    where
        G: GattClient + 'static,
        M: GroupMembership + 'static,
    {
        config.validate()?;

        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();
        let stats = SupervisorStats::new();

        let worker =
            spawn_dispatch_worker(config, gatt, groups, command_rx, event_tx, stats.clone());

        Ok(Self {
            command_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            stats,
            _worker: worker,
        })
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Register a connected device with its discovered handles
    pub fn add_device(&self, mirror: DeviceMirror) -> Result<()> {
        self.request(|reply| Command::AddDevice { mirror, reply })?
    }

    /// Returns false if the device was not registered
    pub fn remove_device(&self, device: &DeviceId) -> Result<bool> {
        self.request(|reply| Command::RemoveDevice {
            device: device.clone(),
            reply,
        })
    }

    /// Snapshot of the last-known state of a device
    pub fn mirror(&self, device: &DeviceId) -> Result<Option<DeviceMirror>> {
        self.request(|reply| Command::Mirror {
            device: device.clone(),
            reply,
        })
    }

    /// Handle for the Bluetooth stack to report GATT results
    pub fn gatt_sink(&self) -> GattEventSink {
        GattEventSink {
            command_tx: self.command_tx.clone(),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Issue any control-point command
    pub fn execute(&self, target: impl Into<Target>, command: ControlCommand) -> Result<OperationId> {
        let target = target.into();
        self.request(|reply| Command::Execute {
            target,
            command,
            reply,
        })?
    }

    pub fn set_volume(&self, target: impl Into<Target>, volume: u8) -> Result<OperationId> {
        self.execute(target, VolumeCommand::SetAbsoluteVolume(volume).into())
    }

    pub fn volume_up(&self, target: impl Into<Target>) -> Result<OperationId> {
        self.execute(target, VolumeCommand::VolumeUp.into())
    }

    pub fn volume_down(&self, target: impl Into<Target>) -> Result<OperationId> {
        self.execute(target, VolumeCommand::VolumeDown.into())
    }

    pub fn mute(&self, target: impl Into<Target>) -> Result<OperationId> {
        self.execute(target, VolumeCommand::Mute.into())
    }

    pub fn unmute(&self, target: impl Into<Target>) -> Result<OperationId> {
        self.execute(target, VolumeCommand::Unmute.into())
    }

    pub fn set_volume_offset(
        &self,
        target: impl Into<Target>,
        offset_id: u8,
        offset: i16,
    ) -> Result<OperationId> {
        self.execute(
            target,
            ControlCommand::Offset {
                offset_id,
                command: OffsetCommand::SetVolumeOffset(offset),
            },
        )
    }

    pub fn set_input_gain(
        &self,
        target: impl Into<Target>,
        input_id: u8,
        gain: i8,
    ) -> Result<OperationId> {
        self.input(target, input_id, InputCommand::SetGain(gain))
    }

    pub fn mute_input(&self, target: impl Into<Target>, input_id: u8) -> Result<OperationId> {
        self.input(target, input_id, InputCommand::Mute)
    }

    pub fn unmute_input(&self, target: impl Into<Target>, input_id: u8) -> Result<OperationId> {
        self.input(target, input_id, InputCommand::Unmute)
    }

    /// Switch an input between manual and automatic gain
    pub fn set_input_gain_mode(
        &self,
        target: impl Into<Target>,
        input_id: u8,
        automatic: bool,
    ) -> Result<OperationId> {
        let command = if automatic {
            InputCommand::SetAutoGainMode
        } else {
            InputCommand::SetManualGainMode
        };
        self.input(target, input_id, command)
    }

    /// Cancel an operation; `Ok(false)` if it already finished
    pub fn cancel(&self, id: OperationId) -> Result<bool> {
        self.request(|reply| Command::Cancel { id, reply })
    }

    // ========================================================================
    // Non-counter characteristics
    // ========================================================================

    pub fn set_offset_location(
        &self,
        device: &DeviceId,
        offset_id: u8,
        location: AudioLocation,
    ) -> Result<()> {
        self.request(|reply| Command::SetOffsetLocation {
            device: device.clone(),
            offset_id,
            location,
            reply,
        })?
    }

    pub fn set_offset_description(
        &self,
        device: &DeviceId,
        offset_id: u8,
        description: impl Into<String>,
    ) -> Result<()> {
        let description = description.into();
        self.request(|reply| Command::SetOffsetDescription {
            device: device.clone(),
            offset_id,
            description,
            reply,
        })?
    }

    pub fn set_input_description(
        &self,
        device: &DeviceId,
        input_id: u8,
        description: impl Into<String>,
    ) -> Result<()> {
        let description = description.into();
        self.request(|reply| Command::SetInputDescription {
            device: device.clone(),
            input_id,
            description,
            reply,
        })?
    }

    pub fn refresh_volume(&self, device: &DeviceId) -> Result<()> {
        self.request(|reply| Command::RefreshVolume {
            device: device.clone(),
            reply,
        })?
    }

    pub fn refresh_offset(&self, device: &DeviceId, offset_id: u8) -> Result<()> {
        self.request(|reply| Command::RefreshOffset {
            device: device.clone(),
            offset_id,
            reply,
        })?
    }

    pub fn refresh_input(&self, device: &DeviceId, input_id: u8) -> Result<()> {
        self.request(|reply| Command::RefreshInput {
            device: device.clone(),
            input_id,
            reply,
        })?
    }

    // ========================================================================
    // Events and diagnostics
    // ========================================================================

    /// Get a blocking iterator over events
    ///
    /// Returns an iterator that blocks on `next()` until an event is available.
    /// Use `try_recv()` for non-blocking access.
    pub fn iter(&self) -> EventIterator {
        EventIterator::new(Arc::clone(&self.event_rx))
    }

    /// Deadline timer accounting
    pub fn stats(&self) -> &SupervisorStats {
        &self.stats
    }

    /// Human-readable dump of every device and in-flight operation
    pub fn dump(&self) -> Result<String> {
        self.request(|reply| Command::Dump { reply })
    }

    /// Cancel every in-flight operation; returns how many were canceled
    pub fn teardown(&self) -> Result<usize> {
        self.request(|reply| Command::Teardown { reply })
    }

    /// Shutdown the background worker
    ///
    /// Called automatically on drop. In-flight operations complete as
    /// canceled before the worker exits.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown);
    }

    fn input(&self, target: impl Into<Target>, input_id: u8, command: InputCommand) -> Result<OperationId> {
        self.execute(target, ControlCommand::Input { input_id, command })
    }

    fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .map_err(|_| CoordinatorError::WorkerDisconnected)?;
        reply_rx
            .blocking_recv()
            .map_err(|_| CoordinatorError::WorkerDisconnected)
    }
}

impl Drop for VolumeControlManager {
    fn drop(&mut self) {
        tracing::debug!(
            "VolumeControlManager dropping, {} deadline(s) outstanding",
            self.stats.outstanding()
        );
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

/// Feeds GATT results and notifications into the dispatch worker
///
/// Cheap to clone; hand one to every thread of the Bluetooth stack that
/// produces [`GattEvent`]s.
#[derive(Debug, Clone)]
pub struct GattEventSink {
    command_tx: tokio_mpsc::UnboundedSender<Command>,
}

impl GattEventSink {
    pub fn send(&self, event: GattEvent) -> Result<()> {
        self.command_tx
            .send(Command::Gatt(event))
            .map_err(|_| CoordinatorError::WorkerDisconnected)
    }
}
