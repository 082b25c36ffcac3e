//! Operation model
//!
//! A [`VolumeOperation`] is one logical request (or one autonomous change)
//! spanning one or more devices. Each target device has its own slot whose
//! state machine records where that device's write stands:
//!
//! ```text
//! Pending → Dispatched → (Refreshing → Dispatched)* → Accepted → Resolved
//! ```
//!
//! The operation owns its deadline timer; dropping the operation releases it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use tokio::time::Instant;
use vcp_api::{ControlCommand, InstanceRef, RejectReason};
use vcp_state::{DeviceId, GroupId, InstanceState};

use crate::timeout::TimerHandle;

/// Unique identifier of an operation, monotonic per coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Who or what an operation is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Device(DeviceId),
    Group(GroupId),
}

impl From<DeviceId> for Target {
    fn from(device: DeviceId) -> Self {
        Target::Device(device)
    }
}

impl From<GroupId> for Target {
    fn from(group: GroupId) -> Self {
        Target::Group(group)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Device(device) => write!(f, "{}", device),
            Target::Group(group) => write!(f, "{}", group),
        }
    }
}

/// A change a peer reported without being asked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomousChange {
    pub origin: DeviceId,
    pub instance: InstanceRef,
    pub state: InstanceState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    HostCommand(ControlCommand),
    AutonomousUpdate(AutonomousChange),
}

impl OperationKind {
    pub fn instance(&self) -> InstanceRef {
        match self {
            OperationKind::HostCommand(command) => command.instance(),
            OperationKind::AutonomousUpdate(change) => change.instance,
        }
    }

    pub fn is_autonomous(&self) -> bool {
        matches!(self, OperationKind::AutonomousUpdate(_))
    }

    /// Short label for logs
    pub fn label(&self) -> String {
        match self {
            OperationKind::HostCommand(command) => {
                format!("{} opcode 0x{:02x}", command.instance(), command.opcode())
            }
            OperationKind::AutonomousUpdate(change) => {
                format!("autonomous {} from {}", change.instance, change.origin)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancelReason {
    /// The host canceled this operation
    Host,
    /// The coordinator is shutting down
    Teardown,
}

/// Why a device did not apply an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    Timeout,
    Disconnected,
    Rejected(RejectReason),
    /// Invalid change counter persisted past the retry budget
    CounterMismatch,
    Canceled(CancelReason),
    Transport(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timed out"),
            FailureReason::Disconnected => write!(f, "disconnected"),
            FailureReason::Rejected(reason) => write!(f, "rejected: {}", reason),
            FailureReason::CounterMismatch => write!(f, "change counter mismatch"),
            FailureReason::Canceled(reason) => write!(f, "canceled ({:?})", reason),
            FailureReason::Transport(message) => write!(f, "transport: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceOutcome {
    Success,
    Failed(FailureReason),
}

impl DeviceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeviceOutcome::Success)
    }
}

/// Where one device's part of an operation stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Pending,
    /// Write issued with `counter`; `attempt` counts counter refreshes so far
    Dispatched { counter: u8, attempt: u8 },
    /// Re-reading state after an invalid change counter response
    Refreshing { attempt: u8 },
    /// The peer notified the written state before answering the write
    Observed { counter: u8, attempt: u8 },
    /// The peer accepted the write; waiting for its state notification
    Accepted { counter: u8 },
    Resolved(DeviceOutcome),
}

impl SlotState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SlotState::Resolved(_))
    }

    /// A write is outstanding on the air
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SlotState::Dispatched { .. }
                | SlotState::Refreshing { .. }
                | SlotState::Observed { .. }
        )
    }
}

/// One device's part of an operation
///
/// Holds the commands still to be written to this device. Host commands
/// write once; an autonomous change propagated to a group member may need a
/// volume write followed by a mute write.
#[derive(Debug, Clone)]
pub struct DeviceSlot {
    pub state: SlotState,
    commands: Vec<ControlCommand>,
    step: usize,
}

impl DeviceSlot {
    pub fn new(commands: Vec<ControlCommand>) -> Self {
        Self {
            state: SlotState::Pending,
            commands,
            step: 0,
        }
    }

    /// The command currently being written, if any
    pub fn current_command(&self) -> Option<&ControlCommand> {
        self.commands.get(self.step)
    }

    /// Move to the next command; returns it if there is one
    pub fn advance(&mut self) -> Option<ControlCommand> {
        self.step += 1;
        let next = self.commands.get(self.step).copied();
        if next.is_some() {
            self.state = SlotState::Pending;
        }
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    /// At least one control-point write went out
    Started,
}

/// A tracked operation
#[derive(Debug)]
pub struct VolumeOperation {
    pub id: OperationId,
    pub group: Option<GroupId>,
    pub kind: OperationKind,
    pub targets: Vec<DeviceId>,
    pub lifecycle: Lifecycle,
    pub created_at: Instant,
    pub(crate) slots: BTreeMap<DeviceId, DeviceSlot>,
    pub(crate) timer: Option<TimerHandle>,
}

impl VolumeOperation {
    pub(crate) fn new(
        id: OperationId,
        kind: OperationKind,
        targets: Vec<(DeviceId, Vec<ControlCommand>)>,
        group: Option<GroupId>,
    ) -> Self {
        let mut order = Vec::with_capacity(targets.len());
        let mut slots = BTreeMap::new();
        for (device, commands) in targets {
            if slots.insert(device.clone(), DeviceSlot::new(commands)).is_none() {
                order.push(device);
            }
        }
        Self {
            id,
            group,
            kind,
            targets: order,
            lifecycle: Lifecycle::Created,
            created_at: Instant::now(),
            slots,
            timer: None,
        }
    }

    pub fn instance(&self) -> InstanceRef {
        self.kind.instance()
    }

    /// Opcode of the host command, if this is one
    pub fn opcode(&self) -> Option<u8> {
        match &self.kind {
            OperationKind::HostCommand(command) => Some(command.opcode()),
            OperationKind::AutonomousUpdate(_) => None,
        }
    }

    pub fn arguments(&self) -> Vec<u8> {
        match &self.kind {
            OperationKind::HostCommand(command) => command.arguments(),
            OperationKind::AutonomousUpdate(_) => Vec::new(),
        }
    }

    pub fn slot(&self, device: &DeviceId) -> Option<&DeviceSlot> {
        self.slots.get(device)
    }

    pub fn slot_state(&self, device: &DeviceId) -> Option<&SlotState> {
        self.slots.get(device).map(|slot| &slot.state)
    }

    pub fn references(&self, device: &DeviceId) -> bool {
        self.slots.contains_key(device)
    }

    pub fn is_complete(&self) -> bool {
        self.slots.values().all(|slot| slot.state.is_resolved())
    }

    pub fn outstanding(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| !slot.state.is_resolved())
            .count()
    }

    pub(crate) fn resolve_outstanding(&mut self, reason: FailureReason) {
        for slot in self.slots.values_mut() {
            if !slot.state.is_resolved() {
                slot.state = SlotState::Resolved(DeviceOutcome::Failed(reason.clone()));
            }
        }
    }

    pub(crate) fn result(&self, status: CompletionStatus) -> OperationResult {
        let outcomes = self
            .slots
            .iter()
            .filter_map(|(device, slot)| match &slot.state {
                SlotState::Resolved(outcome) => Some((device.clone(), outcome.clone())),
                _ => None,
            })
            .collect();
        OperationResult {
            id: self.id,
            group: self.group,
            kind: self.kind.clone(),
            status,
            outcomes,
        }
    }
}

impl Drop for VolumeOperation {
    fn drop(&mut self) {
        if self.timer.is_none() {
            tracing::warn!("Operation {} released without a deadline timer", self.id);
        }
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    /// Every target resolved before the deadline
    Completed,
    /// The deadline expired with targets outstanding
    Failed,
    Canceled,
}

/// Final report of an operation with one outcome per target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub id: OperationId,
    pub group: Option<GroupId>,
    pub kind: OperationKind,
    pub status: CompletionStatus,
    pub outcomes: BTreeMap<DeviceId, DeviceOutcome>,
}

impl OperationResult {
    pub fn is_full_success(&self) -> bool {
        self.status == CompletionStatus::Completed
            && self.outcomes.values().all(DeviceOutcome::is_success)
    }

    pub fn succeeded(&self) -> Vec<&DeviceId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_success())
            .map(|(device, _)| device)
            .collect()
    }

    pub fn failed(&self) -> Vec<(&DeviceId, &FailureReason)> {
        self.outcomes
            .iter()
            .filter_map(|(device, outcome)| match outcome {
                DeviceOutcome::Failed(reason) => Some((device, reason)),
                DeviceOutcome::Success => None,
            })
            .collect()
    }

    pub fn outcome(&self, device: &DeviceId) -> Option<&DeviceOutcome> {
        self.outcomes.get(device)
    }
}

/// Progress reported when a device slot resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Other targets are still outstanding
    InFlight,
    Completed(OperationResult),
}
