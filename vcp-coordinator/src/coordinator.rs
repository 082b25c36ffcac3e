//! Coordinator: dispatch and reconciliation
//!
//! Single-writer state machine. Every input (host request, GATT result,
//! notification, disconnect, deadline) is handled to completion on `&mut
//! self` before the next one is looked at, so operation slots and the device
//! mirrors never need locking.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::mpsc;

use vcp_api::{
    decode_response, AudioLocation, ControlCommand, ControlPointResponse, InstanceRef,
    VolumeState,
};
use vcp_state::{DeviceId, DeviceMirror, Handle, InstanceState, MirrorUpdate, StateError};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, GattError, Result};
use crate::event::CoordinatorEvent;
use crate::gatt::{GattClient, GattEvent};
use crate::group::{propagation_targets, resolve_group_targets};
use crate::groups::GroupMembership;
use crate::operation::{
    AutonomousChange, CancelReason, DeviceOutcome, FailureReason, OperationId, OperationKind,
    OperationStatus, SlotState, Target,
};
use crate::session::DeviceSession;
use crate::timeout::{SupervisorStats, TimeoutSupervisor};
use crate::tracker::OperationTracker;

pub struct Coordinator<G: GattClient, M: GroupMembership> {
    config: CoordinatorConfig,
    gatt: G,
    groups: M,
    sessions: BTreeMap<DeviceId, DeviceSession>,
    tracker: OperationTracker,
    events: mpsc::Sender<CoordinatorEvent>,
}

impl<G: GattClient, M: GroupMembership> Coordinator<G, M> {
    pub fn new(
        config: CoordinatorConfig,
        gatt: G,
        groups: M,
        supervisor: TimeoutSupervisor,
        events: mpsc::Sender<CoordinatorEvent>,
    ) -> Self {
        Self {
            config,
            gatt,
            groups,
            sessions: BTreeMap::new(),
            tracker: OperationTracker::new(supervisor),
            events,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &SupervisorStats {
        self.tracker.supervisor().stats()
    }

    pub fn mirror(&self, device: &DeviceId) -> Option<&DeviceMirror> {
        self.sessions.get(device).map(|session| &session.mirror)
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.sessions.keys().cloned().collect()
    }

    // ========================================================================
    // Devices
    // ========================================================================

    /// Register a connected device whose handles have been discovered
    ///
    /// Registering a device that is already known replaces its session as
    /// if it had disconnected first.
    pub fn add_device(&mut self, mirror: DeviceMirror) -> Result<()> {
        let device = mirror.device.clone();
        if self.sessions.contains_key(&device) {
            tracing::warn!("{} registered again, replacing its session", device);
            self.handle_disconnect(&device);
        }

        for handle in mirror.notification_handles() {
            if let Err(e) = self.gatt.subscribe_notifications(&device, handle) {
                tracing::warn!(
                    "Failed to subscribe to 0x{:04x} on {}: {}",
                    handle,
                    device,
                    e
                );
            }
        }

        let outputs = mirror.offsets.len();
        let inputs = mirror.inputs.len();
        self.sessions
            .insert(device.clone(), DeviceSession::new(mirror));
        tracing::info!(
            "{} available with {} output(s) and {} input(s)",
            device,
            outputs,
            inputs
        );
        self.emit(CoordinatorEvent::DeviceAvailable {
            device,
            outputs,
            inputs,
        });
        Ok(())
    }

    /// Forget a device; pending operations resolve it as disconnected
    pub fn remove_device(&mut self, device: &DeviceId) -> bool {
        self.handle_disconnect(device)
    }

    // ========================================================================
    // Host operations
    // ========================================================================

    /// Issue `command` to a device or a whole group
    ///
    /// Returns as soon as the writes are queued; the outcome is reported as
    /// [`CoordinatorEvent::OperationCompleted`].
    pub fn execute(&mut self, target: Target, command: ControlCommand) -> Result<OperationId> {
        use vcp_api::Validate;
        command.validate()?;

        let (targets, group) = match &target {
            Target::Device(device) => {
                let session = self.sessions.get(device).ok_or_else(|| {
                    CoordinatorError::InvalidTarget(format!("{} is not connected", device))
                })?;
                session.check_command(&command)?;
                (vec![device.clone()], None)
            }
            Target::Group(group) => (
                resolve_group_targets(&self.groups, &self.sessions, *group, &command)?,
                Some(*group),
            ),
        };

        let id = self.tracker.start_operation(
            OperationKind::HostCommand(command),
            targets
                .iter()
                .map(|device| (device.clone(), vec![command]))
                .collect(),
            group,
            self.config.operation_timeout,
        )?;
        tracing::info!(
            "{}: {} opcode 0x{:02x} to {}",
            id,
            command.instance(),
            command.opcode(),
            target
        );

        for device in &targets {
            self.dispatch(id, device);
        }
        Ok(id)
    }

    /// Cancel an operation; returns false if it already finished
    pub fn cancel(&mut self, id: OperationId) -> bool {
        match self.tracker.cancel(id, CancelReason::Host) {
            Some(result) => {
                self.emit(CoordinatorEvent::OperationCompleted(result));
                true
            }
            None => false,
        }
    }

    /// Cancel everything in flight
    pub fn teardown(&mut self) -> usize {
        let results = self.tracker.cancel_all(CancelReason::Teardown);
        let count = results.len();
        for result in results {
            self.emit(CoordinatorEvent::OperationCompleted(result));
        }
        if count > 0 {
            tracing::info!("Teardown canceled {} operation(s)", count);
        }
        count
    }

    pub fn set_offset_location(
        &mut self,
        device: &DeviceId,
        offset_id: u8,
        location: AudioLocation,
    ) -> Result<()> {
        let offset = self
            .session(device)?
            .mirror
            .offsets
            .find_by_id(offset_id)
            .ok_or(StateError::UnknownOffset(offset_id))?;
        if !offset.location_writable || offset.handles.location == 0 {
            return Err(StateError::NotWritable("audio location").into());
        }
        self.gatt
            .write_without_response(device, offset.handles.location, &location.encode())?;
        Ok(())
    }

    pub fn set_offset_description(
        &mut self,
        device: &DeviceId,
        offset_id: u8,
        description: &str,
    ) -> Result<()> {
        let offset = self
            .session(device)?
            .mirror
            .offsets
            .find_by_id(offset_id)
            .ok_or(StateError::UnknownOffset(offset_id))?;
        if !offset.description_writable || offset.handles.description == 0 {
            return Err(StateError::NotWritable("audio output description").into());
        }
        self.gatt
            .write_without_response(device, offset.handles.description, description.as_bytes())?;
        Ok(())
    }

    pub fn set_input_description(
        &mut self,
        device: &DeviceId,
        input_id: u8,
        description: &str,
    ) -> Result<()> {
        let input = self
            .session(device)?
            .mirror
            .inputs
            .find_by_id(input_id)
            .ok_or(StateError::UnknownInput(input_id))?;
        if !input.description_writable || input.handles.description == 0 {
            return Err(StateError::NotWritable("audio input description").into());
        }
        self.gatt
            .write_without_response(device, input.handles.description, description.as_bytes())?;
        Ok(())
    }

    /// Re-read Volume State and Volume Flags
    pub fn refresh_volume(&mut self, device: &DeviceId) -> Result<()> {
        let handles = self.session(device)?.mirror.volume.handles;
        self.read_all(device, &[handles.state, handles.flags])
    }

    /// Re-read everything readable on one volume offset
    pub fn refresh_offset(&mut self, device: &DeviceId, offset_id: u8) -> Result<()> {
        let handles = self
            .session(device)?
            .mirror
            .offsets
            .find_by_id(offset_id)
            .ok_or(StateError::UnknownOffset(offset_id))?
            .handles;
        self.read_all(
            device,
            &[handles.state, handles.location, handles.description],
        )
    }

    /// Re-read everything readable on one audio input
    pub fn refresh_input(&mut self, device: &DeviceId, input_id: u8) -> Result<()> {
        let handles = self
            .session(device)?
            .mirror
            .inputs
            .find_by_id(input_id)
            .ok_or(StateError::UnknownInput(input_id))?
            .handles;
        self.read_all(
            device,
            &[
                handles.state,
                handles.gain_setting,
                handles.input_type,
                handles.status,
                handles.description,
            ],
        )
    }

    /// Diagnostic dump of every session and in-flight operation
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let stats = self.stats();
        let _ = writeln!(
            out,
            "coordinator: {} device(s), {} operation(s), timers scheduled={} released={} fired={}",
            self.sessions.len(),
            self.tracker.len(),
            stats.scheduled(),
            stats.released(),
            stats.fired()
        );
        for session in self.sessions.values() {
            let _ = write!(out, "{}", session.mirror);
        }
        for operation in self.tracker.iter() {
            let _ = writeln!(
                out,
                "{} [{}] group={} {:?} age={:?}",
                operation.id,
                operation.kind.label(),
                operation
                    .group
                    .map(|group| group.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                operation.lifecycle,
                operation.created_at.elapsed()
            );
            for device in &operation.targets {
                if let Some(state) = operation.slot_state(device) {
                    let _ = writeln!(out, "  {}: {:?}", device, state);
                }
            }
        }
        out
    }

    // ========================================================================
    // Inputs from the GATT layer and the timer
    // ========================================================================

    pub fn handle_gatt_event(&mut self, event: GattEvent) {
        match event {
            GattEvent::WriteComplete { device, op, status } => {
                self.on_write_complete(&device, op, &status)
            }
            GattEvent::ReadComplete {
                device,
                handle,
                result,
                op,
            } => self.on_read_complete(&device, handle, result, op),
            GattEvent::Notification {
                device,
                handle,
                value,
            } => self.on_notification(&device, handle, &value),
            GattEvent::Disconnected { device } => {
                self.handle_disconnect(&device);
            }
        }
    }

    pub fn on_timer_expired(&mut self, id: OperationId) {
        if let Some(result) = self.tracker.on_timeout(id) {
            self.emit(CoordinatorEvent::OperationCompleted(result));
        }
    }

    fn on_write_complete(&mut self, device: &DeviceId, op: OperationId, status: &[u8]) {
        let (counter, attempt, observed) = match self.tracker.slot_state(op, device) {
            Some(SlotState::Dispatched { counter, attempt }) => (*counter, *attempt, false),
            Some(SlotState::Observed { counter, attempt }) => (*counter, *attempt, true),
            _ => {
                tracing::debug!("Ignoring write response from {} for {}", device, op);
                return;
            }
        };
        let Some(command) = self
            .tracker
            .slot_mut(op, device)
            .and_then(|slot| slot.current_command().copied())
        else {
            return;
        };
        let instance = command.instance();

        match decode_response(command.service(), status) {
            ControlPointResponse::Accepted => {
                let session = self.sessions.get(device);
                let counter_moved = session
                    .and_then(|session| session.mirror.change_counter(instance))
                    .is_some_and(|current| current != counter);
                let noop = session.is_some_and(|session| session.is_noop(&command));

                if observed || counter_moved || noop {
                    tracing::debug!("{} accepted {} and is already settled", device, op);
                    self.step_succeeded(op, device);
                } else {
                    tracing::debug!("{} accepted {}, waiting for {} state", device, op, instance);
                    self.tracker
                        .set_slot_state(op, device, SlotState::Accepted { counter });
                }
            }
            ControlPointResponse::Rejected(reason) => {
                tracing::warn!("{} rejected {}: {}", device, op, reason);
                self.resolve(
                    op,
                    device,
                    DeviceOutcome::Failed(FailureReason::Rejected(reason)),
                );
            }
            ControlPointResponse::CounterMismatch => {
                if attempt >= self.config.max_counter_retries {
                    tracing::warn!(
                        "{} reported a stale change counter for {} after {} refresh(es)",
                        device,
                        op,
                        attempt
                    );
                    self.resolve(
                        op,
                        device,
                        DeviceOutcome::Failed(FailureReason::CounterMismatch),
                    );
                    return;
                }

                tracing::debug!("{} counter mismatch on {}, refreshing {}", device, op, instance);
                self.tracker.set_slot_state(
                    op,
                    device,
                    SlotState::Refreshing {
                        attempt: attempt + 1,
                    },
                );
                let read = self
                    .sessions
                    .get(device)
                    .and_then(|session| session.mirror.state_handle(instance))
                    .ok_or_else(|| GattError::Failed(format!("no state handle for {}", instance)))
                    .and_then(|handle| self.gatt.read_characteristic(device, handle, Some(op)));
                if let Err(e) = read {
                    self.resolve(
                        op,
                        device,
                        DeviceOutcome::Failed(FailureReason::Transport(e.to_string())),
                    );
                }
            }
        }
    }

    fn on_read_complete(
        &mut self,
        device: &DeviceId,
        handle: Handle,
        result: std::result::Result<Vec<u8>, GattError>,
        op: Option<OperationId>,
    ) {
        match &result {
            Ok(value) => self.apply_read(device, handle, value),
            Err(e) => tracing::warn!("Read of 0x{:04x} on {} failed: {}", handle, device, e),
        }

        let Some(op) = op else {
            return;
        };
        if !matches!(
            self.tracker.slot_state(op, device),
            Some(SlotState::Refreshing { .. })
        ) {
            tracing::debug!("Ignoring refresh read from {} for {}", device, op);
            return;
        }
        match result {
            Ok(_) => self.dispatch(op, device),
            Err(e) => self.resolve(
                op,
                device,
                DeviceOutcome::Failed(FailureReason::Transport(e.to_string())),
            ),
        }
    }

    fn apply_read(&mut self, device: &DeviceId, handle: Handle, value: &[u8]) {
        let Some(session) = self.sessions.get_mut(device) else {
            tracing::debug!("Read result from unknown device {}", device);
            return;
        };
        match session.mirror.apply_value(handle, value) {
            Ok(MirrorUpdate::State { instance, state }) => {
                self.emit(CoordinatorEvent::StateRefreshed {
                    device: device.clone(),
                    instance,
                    state,
                });
            }
            Ok(update) => self.emit_mirror_update(device, update),
            Err(e) => tracing::warn!("Bad value for 0x{:04x} from {}: {}", handle, device, e),
        }
    }

    fn on_notification(&mut self, device: &DeviceId, handle: Handle, value: &[u8]) {
        let Some(session) = self.sessions.get_mut(device) else {
            tracing::debug!("Notification from unknown device {}", device);
            return;
        };
        tracing::debug!("<- {} 0x{:04x} {:02x?}", device, handle, value);
        match session.mirror.apply_value(handle, value) {
            Ok(MirrorUpdate::State { instance, state }) => {
                self.on_state_changed(device, instance, state)
            }
            Ok(update) => self.emit_mirror_update(device, update),
            Err(e) => {
                tracing::warn!("Bad notification on 0x{:04x} from {}: {}", handle, device, e);
                self.settle_on_counter(device, handle);
            }
        }
    }

    /// Settle an accepted write whose confirming state could not be mirrored
    ///
    /// The mirror still takes the change counter of such a value, so a
    /// counter past the one written means the peer applied the write.
    fn settle_on_counter(&mut self, device: &DeviceId, handle: Handle) {
        let Some(mirror) = self.mirror(device) else {
            return;
        };
        let Some((instance, _)) = mirror.instance_for_handle(handle) else {
            return;
        };
        let current = mirror.change_counter(instance);
        let Some(op) = self.tracker.find_accepted(device, instance) else {
            return;
        };
        let Some(SlotState::Accepted { counter }) = self.tracker.slot_state(op, device) else {
            return;
        };
        if current.is_some_and(|current| current != *counter) {
            tracing::debug!("{} moved {} counter past {}, settling it", device, instance, op);
            self.step_succeeded(op, device);
        }
    }

    /// Attribute a state notification to a write of ours, or treat it as an
    /// autonomous change
    fn on_state_changed(&mut self, device: &DeviceId, instance: InstanceRef, state: InstanceState) {
        if let Some(op) = self.tracker.find_accepted(device, instance) {
            tracing::debug!("{} {} state confirms {}", device, instance, op);
            self.emit_refreshed(device, instance, state);
            self.step_succeeded(op, device);
            return;
        }
        if let Some((op, counter, attempt)) = self.find_observed_write(device, instance, &state) {
            tracing::debug!("{} applied {} before answering it", device, op);
            self.tracker
                .set_slot_state(op, device, SlotState::Observed { counter, attempt });
            self.emit_refreshed(device, instance, state);
            return;
        }
        self.start_autonomous(device, instance, state);
    }

    /// Oldest unanswered write to `(device, instance)` whose target value the
    /// mirror now holds under a newer change counter
    fn find_observed_write(
        &self,
        device: &DeviceId,
        instance: InstanceRef,
        state: &InstanceState,
    ) -> Option<(OperationId, u8, u8)> {
        let session = self.sessions.get(device)?;
        for op in self.tracker.awaiting_response(device, instance) {
            let Some(slot) = self.tracker.get(op).and_then(|operation| operation.slot(device))
            else {
                continue;
            };
            let SlotState::Dispatched { counter, attempt } = slot.state else {
                continue;
            };
            let Some(command) = slot.current_command() else {
                continue;
            };
            if state.change_counter() != counter && session.is_noop(command) {
                return Some((op, counter, attempt));
            }
        }
        None
    }

    fn emit_refreshed(&self, device: &DeviceId, instance: InstanceRef, state: InstanceState) {
        self.emit(CoordinatorEvent::StateRefreshed {
            device: device.clone(),
            instance,
            state,
        });
    }

    fn start_autonomous(&mut self, device: &DeviceId, instance: InstanceRef, state: InstanceState) {
        let mut targets = vec![(device.clone(), Vec::new())];
        let mut group = None;

        if let InstanceState::Volume(volume) = state {
            if let Some((member_group, members)) = self.propagation_plan(device, &volume) {
                group = Some(member_group);
                targets.extend(members);
            }
        }

        let deadline = if targets.len() > 1 {
            self.config.operation_timeout
        } else {
            self.config.autonomous_timeout
        };
        let change = AutonomousChange {
            origin: device.clone(),
            instance,
            state,
        };
        let id = match self.tracker.start_operation(
            OperationKind::AutonomousUpdate(change),
            targets.clone(),
            group,
            deadline,
        ) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to track autonomous change from {}: {}", device, e);
                return;
            }
        };

        tracing::info!(
            "{}: autonomous {} change from {}, {} follower(s)",
            id,
            instance,
            device,
            targets.len() - 1
        );
        self.emit(CoordinatorEvent::AutonomousUpdate {
            device: device.clone(),
            instance,
            state,
            operation: id,
        });

        for (member, _) in targets.iter().skip(1) {
            self.dispatch(id, member);
        }
        self.resolve(id, device, DeviceOutcome::Success);
    }

    /// Group members that should follow an autonomous volume change
    fn propagation_plan(
        &self,
        origin: &DeviceId,
        state: &VolumeState,
    ) -> Option<(vcp_state::GroupId, Vec<(DeviceId, Vec<ControlCommand>)>)> {
        if !self.config.propagate_autonomous_group_changes {
            return None;
        }
        if let Some(op) = self.tracker.find_in_flight(origin, InstanceRef::Volume) {
            tracing::debug!(
                "Not propagating {} volume change: {} is in flight",
                origin,
                op
            );
            return None;
        }
        let group = self.groups.group_of(origin)?;
        let members = propagation_targets(
            &self.groups,
            &self.sessions,
            group,
            origin,
            state,
            |member| {
                self.tracker
                    .find_in_flight(member, InstanceRef::Volume)
                    .is_some()
            },
        );
        (!members.is_empty()).then_some((group, members))
    }

    /// Resolve `device` as disconnected everywhere and drop its session
    fn handle_disconnect(&mut self, device: &DeviceId) -> bool {
        for id in self.tracker.operations_for_device(device) {
            self.resolve(
                id,
                device,
                DeviceOutcome::Failed(FailureReason::Disconnected),
            );
        }

        let Some(mut session) = self.sessions.remove(device) else {
            tracing::debug!("Disconnect of unknown device {}", device);
            return false;
        };
        session.mirror.clear();
        tracing::info!(
            "{} removed after {:?}",
            device,
            session.connected_at.elapsed()
        );
        self.emit(CoordinatorEvent::DeviceRemoved {
            device: device.clone(),
        });
        true
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn session(&self, device: &DeviceId) -> Result<&DeviceSession> {
        self.sessions
            .get(device)
            .ok_or_else(|| CoordinatorError::InvalidTarget(format!("{} is not connected", device)))
    }

    fn read_all(&self, device: &DeviceId, handles: &[Handle]) -> Result<()> {
        for &handle in handles.iter().filter(|handle| **handle != 0) {
            self.gatt.read_characteristic(device, handle, None)?;
        }
        Ok(())
    }

    /// Write the slot's current command with the device's last-known counter
    fn dispatch(&mut self, id: OperationId, device: &DeviceId) {
        let Some(slot) = self.tracker.slot_mut(id, device) else {
            return;
        };
        let Some(command) = slot.current_command().copied() else {
            return;
        };
        let attempt = match slot.state {
            SlotState::Refreshing { attempt } => attempt,
            _ => 0,
        };

        match self.write_command(id, device, &command) {
            Ok(counter) => {
                self.tracker
                    .set_slot_state(id, device, SlotState::Dispatched { counter, attempt });
                self.tracker.mark_started(id);
            }
            Err(reason) => {
                tracing::warn!("Could not write {} to {}: {}", id, device, reason);
                self.resolve(id, device, DeviceOutcome::Failed(reason));
            }
        }
    }

    fn write_command(
        &self,
        id: OperationId,
        device: &DeviceId,
        command: &ControlCommand,
    ) -> std::result::Result<u8, FailureReason> {
        let session = self
            .sessions
            .get(device)
            .ok_or(FailureReason::Disconnected)?;
        let instance = command.instance();
        let handle = session
            .mirror
            .control_point_handle(instance)
            .ok_or_else(|| FailureReason::Transport(format!("no control point for {}", instance)))?;
        let counter = session.mirror.change_counter(instance).unwrap_or_default();
        let bytes = command
            .encode(counter)
            .map_err(|e| FailureReason::Transport(e.to_string()))?;

        tracing::debug!("-> {} {} {:02x?} ({})", device, instance, bytes, id);
        self.gatt
            .write_control_point(device, handle, &bytes, id)
            .map_err(|e| FailureReason::Transport(e.to_string()))?;
        Ok(counter)
    }

    /// The current write of a slot took effect; move to its next write or
    /// resolve the device
    fn step_succeeded(&mut self, id: OperationId, device: &DeviceId) {
        let next = self
            .tracker
            .slot_mut(id, device)
            .and_then(|slot| slot.advance());
        if next.is_some() {
            self.dispatch(id, device);
        } else {
            self.resolve(id, device, DeviceOutcome::Success);
        }
    }

    fn resolve(&mut self, id: OperationId, device: &DeviceId, outcome: DeviceOutcome) {
        if let Some(OperationStatus::Completed(result)) =
            self.tracker.on_device_ack(id, device, outcome)
        {
            self.emit(CoordinatorEvent::OperationCompleted(result));
        }
    }

    fn emit_mirror_update(&self, device: &DeviceId, update: MirrorUpdate) {
        if let Some(event) = CoordinatorEvent::from_mirror_update(device.clone(), update) {
            self.emit(event);
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}
