//! Operation Tracker
//!
//! Owns every in-flight operation, keyed by id. Ids are monotonic, so
//! iteration order is age order. An operation leaves the tracker the moment
//! it completes, times out or is canceled; dropping it releases its timer.

use std::collections::BTreeMap;
use std::time::Duration;

use vcp_api::{ControlCommand, InstanceRef};
use vcp_state::{DeviceId, GroupId};

use crate::error::{CoordinatorError, Result};
use crate::operation::{
    CancelReason, CompletionStatus, DeviceOutcome, DeviceSlot, FailureReason, Lifecycle,
    OperationId, OperationKind, OperationResult, OperationStatus, SlotState, VolumeOperation,
};
use crate::timeout::TimeoutSupervisor;

pub struct OperationTracker {
    next_id: u64,
    operations: BTreeMap<OperationId, VolumeOperation>,
    supervisor: TimeoutSupervisor,
}

impl OperationTracker {
    pub fn new(supervisor: TimeoutSupervisor) -> Self {
        Self {
            next_id: 1,
            operations: BTreeMap::new(),
            supervisor,
        }
    }

    pub fn supervisor(&self) -> &TimeoutSupervisor {
        &self.supervisor
    }

    /// Register a new operation and start its deadline
    ///
    /// Each target carries the commands to write to it, in order.
    pub fn start_operation(
        &mut self,
        kind: OperationKind,
        targets: Vec<(DeviceId, Vec<ControlCommand>)>,
        group: Option<GroupId>,
        deadline: Duration,
    ) -> Result<OperationId> {
        if targets.is_empty() {
            return Err(CoordinatorError::InvalidTarget(format!(
                "{} has no target devices",
                kind.label()
            )));
        }

        let id = OperationId::new(self.next_id);
        self.next_id += 1;

        let mut operation = VolumeOperation::new(id, kind, targets, group);
        operation.timer = self.supervisor.schedule(id, deadline);

        tracing::debug!(
            "Started {} ({}) for {} device(s), deadline {:?}",
            id,
            operation.kind.label(),
            operation.targets.len(),
            deadline
        );
        self.operations.insert(id, operation);
        Ok(id)
    }

    /// Note that the first write of `id` went out
    pub fn mark_started(&mut self, id: OperationId) {
        if let Some(operation) = self.operations.get_mut(&id) {
            if operation.lifecycle == Lifecycle::Created {
                operation.lifecycle = Lifecycle::Started;
            }
        }
    }

    pub fn get(&self, id: OperationId) -> Option<&VolumeOperation> {
        self.operations.get(&id)
    }

    pub fn contains(&self, id: OperationId) -> bool {
        self.operations.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VolumeOperation> {
        self.operations.values()
    }

    pub fn slot_mut(&mut self, id: OperationId, device: &DeviceId) -> Option<&mut DeviceSlot> {
        self.operations.get_mut(&id)?.slots.get_mut(device)
    }

    pub fn slot_state(&self, id: OperationId, device: &DeviceId) -> Option<&SlotState> {
        self.operations.get(&id)?.slot_state(device)
    }

    /// Update a slot that is not yet resolved
    pub fn set_slot_state(&mut self, id: OperationId, device: &DeviceId, state: SlotState) {
        if let Some(slot) = self.slot_mut(id, device) {
            if !slot.state.is_resolved() {
                slot.state = state;
            }
        }
    }

    /// Resolve one device of an operation
    ///
    /// The first outcome recorded for a device wins. Returns `None` when the
    /// operation is no longer tracked.
    pub fn on_device_ack(
        &mut self,
        id: OperationId,
        device: &DeviceId,
        outcome: DeviceOutcome,
    ) -> Option<OperationStatus> {
        let operation = self.operations.get_mut(&id)?;
        match operation.slots.get_mut(device) {
            Some(slot) if !slot.state.is_resolved() => {
                tracing::debug!("{} resolved {} as {:?}", device, id, outcome);
                slot.state = SlotState::Resolved(outcome);
            }
            Some(_) => {
                tracing::debug!("{} already resolved for {}", device, id);
            }
            None => {
                tracing::warn!("{} is not a target of {}", device, id);
            }
        }

        if !operation.is_complete() {
            return Some(OperationStatus::InFlight);
        }

        let operation = self.operations.remove(&id)?;
        let result = operation.result(CompletionStatus::Completed);
        tracing::info!(
            "{} completed after {:?}: {} ok, {} failed",
            id,
            operation.created_at.elapsed(),
            result.succeeded().len(),
            result.failed().len()
        );
        Some(OperationStatus::Completed(result))
    }

    /// Fail everything still outstanding on `id` with a timeout
    ///
    /// Returns `None` for operations that already finished.
    pub fn on_timeout(&mut self, id: OperationId) -> Option<OperationResult> {
        let Some(mut operation) = self.operations.remove(&id) else {
            tracing::debug!("Ignoring stale deadline of {}", id);
            return None;
        };
        let outstanding = operation.outstanding();
        operation.resolve_outstanding(FailureReason::Timeout);
        tracing::warn!(
            "{} ({}) timed out with {} device(s) outstanding",
            id,
            operation.kind.label(),
            outstanding
        );
        Some(operation.result(CompletionStatus::Failed))
    }

    /// Cancel `id`; a second cancel of the same id is a no-op
    pub fn cancel(&mut self, id: OperationId, reason: CancelReason) -> Option<OperationResult> {
        let mut operation = self.operations.remove(&id)?;
        operation.resolve_outstanding(FailureReason::Canceled(reason));
        tracing::info!("{} canceled ({:?})", id, reason);
        Some(operation.result(CompletionStatus::Canceled))
    }

    pub fn cancel_all(&mut self, reason: CancelReason) -> Vec<OperationResult> {
        let ids: Vec<OperationId> = self.operations.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.cancel(id, reason))
            .collect()
    }

    /// Operations with a slot for `device`, oldest first
    pub fn operations_for_device(&self, device: &DeviceId) -> Vec<OperationId> {
        self.operations
            .values()
            .filter(|operation| operation.references(device))
            .map(|operation| operation.id)
            .collect()
    }

    /// Oldest operation whose write to `(device, instance)` was accepted and
    /// is waiting for the peer's state notification
    pub fn find_accepted(&self, device: &DeviceId, instance: InstanceRef) -> Option<OperationId> {
        self.find_slot(device, instance, |state| {
            matches!(state, SlotState::Accepted { .. })
        })
    }

    /// Oldest operation with a write outstanding on `(device, instance)`
    pub fn find_in_flight(&self, device: &DeviceId, instance: InstanceRef) -> Option<OperationId> {
        self.find_slot(device, instance, SlotState::is_in_flight)
    }

    /// Operations whose write to `(device, instance)` has not been answered
    /// yet, oldest first
    pub fn awaiting_response(&self, device: &DeviceId, instance: InstanceRef) -> Vec<OperationId> {
        self.operations
            .values()
            .filter(|operation| operation.instance() == instance)
            .filter(|operation| {
                matches!(
                    operation.slot_state(device),
                    Some(SlotState::Dispatched { .. })
                )
            })
            .map(|operation| operation.id)
            .collect()
    }

    fn find_slot(
        &self,
        device: &DeviceId,
        instance: InstanceRef,
        predicate: impl Fn(&SlotState) -> bool,
    ) -> Option<OperationId> {
        self.operations
            .values()
            .filter(|operation| operation.instance() == instance)
            .find(|operation| {
                operation
                    .slot_state(device)
                    .map(|state| predicate(state))
                    .unwrap_or(false)
            })
            .map(|operation| operation.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use vcp_api::VolumeCommand;

    fn device(n: u8) -> DeviceId {
        DeviceId::new(format!("aa:bb:cc:dd:ee:{:02x}", n))
    }

    fn command() -> ControlCommand {
        ControlCommand::Volume(VolumeCommand::SetAbsoluteVolume(30))
    }

    fn tracker() -> (OperationTracker, mpsc::UnboundedReceiver<OperationId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OperationTracker::new(TimeoutSupervisor::new(tx)), rx)
    }

    fn start(tracker: &mut OperationTracker, devices: &[u8]) -> OperationId {
        tracker
            .start_operation(
                OperationKind::HostCommand(command()),
                devices.iter().map(|n| (device(*n), vec![command()])).collect(),
                None,
                Duration::from_secs(2),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_targets_rejected() {
        let (mut tracker, _rx) = tracker();
        let result = tracker.start_operation(
            OperationKind::HostCommand(command()),
            Vec::new(),
            None,
            Duration::from_secs(2),
        );
        assert!(matches!(result, Err(CoordinatorError::InvalidTarget(_))));
        assert_eq!(tracker.supervisor().stats().scheduled(), 0);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let (mut tracker, _rx) = tracker();
        let first = start(&mut tracker, &[1]);
        let second = start(&mut tracker, &[1]);
        assert!(second > first);
        assert_eq!(tracker.operations_for_device(&device(1)), vec![first, second]);
    }

    #[tokio::test]
    async fn test_completion_requires_every_device() {
        let (mut tracker, _rx) = tracker();
        let id = start(&mut tracker, &[1, 2]);
        tracker.mark_started(id);
        assert_eq!(tracker.get(id).unwrap().lifecycle, Lifecycle::Started);

        assert_eq!(
            tracker.on_device_ack(id, &device(1), DeviceOutcome::Success),
            Some(OperationStatus::InFlight)
        );
        let Some(OperationStatus::Completed(result)) =
            tracker.on_device_ack(id, &device(2), DeviceOutcome::Success)
        else {
            panic!("expected completion");
        };
        assert!(result.is_full_success());
        assert!(!tracker.contains(id));

        let stats = tracker.supervisor().stats();
        assert_eq!(stats.scheduled(), 1);
        assert_eq!(stats.released(), 1);
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let (mut tracker, _rx) = tracker();
        let id = start(&mut tracker, &[1, 2]);
        tracker.on_device_ack(
            id,
            &device(1),
            DeviceOutcome::Failed(FailureReason::Disconnected),
        );
        tracker.on_device_ack(id, &device(1), DeviceOutcome::Success);
        assert_eq!(
            tracker.slot_state(id, &device(1)),
            Some(&SlotState::Resolved(DeviceOutcome::Failed(
                FailureReason::Disconnected
            )))
        );
    }

    #[tokio::test]
    async fn test_timeout_and_stale_expiry() {
        let (mut tracker, _rx) = tracker();
        let id = start(&mut tracker, &[1, 2]);
        tracker.on_device_ack(id, &device(1), DeviceOutcome::Success);

        let result = tracker.on_timeout(id).unwrap();
        assert_eq!(result.status, CompletionStatus::Failed);
        assert_eq!(result.outcome(&device(1)), Some(&DeviceOutcome::Success));
        assert_eq!(
            result.outcome(&device(2)),
            Some(&DeviceOutcome::Failed(FailureReason::Timeout))
        );

        assert!(tracker.on_timeout(id).is_none());
        assert!(tracker.on_device_ack(id, &device(2), DeviceOutcome::Success).is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (mut tracker, _rx) = tracker();
        let id = start(&mut tracker, &[1]);
        let result = tracker.cancel(id, CancelReason::Host).unwrap();
        assert_eq!(result.status, CompletionStatus::Canceled);
        assert_eq!(
            result.outcome(&device(1)),
            Some(&DeviceOutcome::Failed(FailureReason::Canceled(CancelReason::Host)))
        );
        assert!(tracker.cancel(id, CancelReason::Host).is_none());
        assert_eq!(tracker.supervisor().stats().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_find_accepted_prefers_oldest() {
        let (mut tracker, _rx) = tracker();
        let first = start(&mut tracker, &[1]);
        let second = start(&mut tracker, &[1]);
        tracker.set_slot_state(second, &device(1), SlotState::Accepted { counter: 2 });
        assert_eq!(tracker.find_accepted(&device(1), InstanceRef::Volume), Some(second));

        tracker.set_slot_state(first, &device(1), SlotState::Accepted { counter: 1 });
        assert_eq!(tracker.find_accepted(&device(1), InstanceRef::Volume), Some(first));
        assert_eq!(tracker.find_accepted(&device(1), InstanceRef::Input(1)), None);
        assert_eq!(tracker.find_accepted(&device(2), InstanceRef::Volume), None);
    }

    #[tokio::test]
    async fn test_find_in_flight() {
        let (mut tracker, _rx) = tracker();
        let id = start(&mut tracker, &[1]);
        assert_eq!(tracker.find_in_flight(&device(1), InstanceRef::Volume), None);
        tracker.set_slot_state(id, &device(1), SlotState::Dispatched { counter: 0, attempt: 0 });
        assert_eq!(tracker.find_in_flight(&device(1), InstanceRef::Volume), Some(id));
    }

    #[tokio::test]
    async fn test_awaiting_response_lists_dispatched_oldest_first() {
        let (mut tracker, _rx) = tracker();
        let first = start(&mut tracker, &[1]);
        let second = start(&mut tracker, &[1]);
        let third = start(&mut tracker, &[1]);
        tracker.set_slot_state(third, &device(1), SlotState::Dispatched { counter: 1, attempt: 0 });
        tracker.set_slot_state(first, &device(1), SlotState::Dispatched { counter: 1, attempt: 0 });
        tracker.set_slot_state(second, &device(1), SlotState::Accepted { counter: 1 });

        assert_eq!(
            tracker.awaiting_response(&device(1), InstanceRef::Volume),
            vec![first, third]
        );
        assert!(tracker.awaiting_response(&device(2), InstanceRef::Volume).is_empty());
        assert!(tracker.awaiting_response(&device(1), InstanceRef::Offset(1)).is_empty());
    }
}
