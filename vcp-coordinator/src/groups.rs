//! Group membership collaborator
//!
//! Membership is owned by whatever tracks coordinated sets on the host. The
//! coordinator only asks who is in a group and which group a device is in.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use vcp_state::{DeviceId, GroupId};

/// Read access to device groups
pub trait GroupMembership: Send {
    /// Members of `group`, empty if the group is unknown
    fn members(&self, group: GroupId) -> Vec<DeviceId>;

    /// The group `device` belongs to, if any
    fn group_of(&self, device: &DeviceId) -> Option<GroupId>;
}

/// In-memory group table with a reverse index
///
/// A device belongs to at most one group; adding it to another moves it.
#[derive(Debug, Clone, Default)]
pub struct GroupRoutingTable {
    groups: HashMap<GroupId, BTreeSet<DeviceId>>,
    device_to_group: HashMap<DeviceId, GroupId>,
}

impl GroupRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a shared table that the host can keep updating while the
    /// coordinator reads it
    pub fn shared() -> SharedGroups {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn add_member(&mut self, group: GroupId, device: DeviceId) {
        if let Some(previous) = self.device_to_group.insert(device.clone(), group) {
            if previous != group {
                self.remove_from_group(previous, &device);
                tracing::debug!("Moved {} from {} to {}", device, previous, group);
            }
        }
        self.groups.entry(group).or_default().insert(device);
    }

    pub fn remove_member(&mut self, device: &DeviceId) -> Option<GroupId> {
        let group = self.device_to_group.remove(device)?;
        self.remove_from_group(group, device);
        Some(group)
    }

    pub fn remove_group(&mut self, group: GroupId) {
        if let Some(members) = self.groups.remove(&group) {
            for device in members {
                self.device_to_group.remove(&device);
            }
        }
    }

    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.groups.keys().copied().collect();
        groups.sort();
        groups
    }

    fn remove_from_group(&mut self, group: GroupId, device: &DeviceId) {
        if let Some(members) = self.groups.get_mut(&group) {
            members.remove(device);
            if members.is_empty() {
                self.groups.remove(&group);
            }
        }
    }
}

impl GroupMembership for GroupRoutingTable {
    fn members(&self, group: GroupId) -> Vec<DeviceId> {
        self.groups
            .get(&group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn group_of(&self, device: &DeviceId) -> Option<GroupId> {
        self.device_to_group.get(device).copied()
    }
}

/// Group table shared between the host and the dispatch worker
pub type SharedGroups = Arc<RwLock<GroupRoutingTable>>;

impl<T: GroupMembership + Sync> GroupMembership for Arc<RwLock<T>> {
    fn members(&self, group: GroupId) -> Vec<DeviceId> {
        self.read().members(group)
    }

    fn group_of(&self, device: &DeviceId) -> Option<GroupId> {
        self.read().group_of(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(n: u8) -> DeviceId {
        DeviceId::new(format!("aa:bb:cc:dd:ee:{:02x}", n))
    }

    #[test]
    fn test_members_sorted_and_reverse_index() {
        let mut table = GroupRoutingTable::new();
        table.add_member(GroupId::new(1), device(2));
        table.add_member(GroupId::new(1), device(1));

        assert_eq!(table.members(GroupId::new(1)), vec![device(1), device(2)]);
        assert_eq!(table.group_of(&device(2)), Some(GroupId::new(1)));
        assert!(table.members(GroupId::new(9)).is_empty());
    }

    #[test]
    fn test_moving_a_device_between_groups() {
        let mut table = GroupRoutingTable::new();
        table.add_member(GroupId::new(1), device(1));
        table.add_member(GroupId::new(2), device(1));

        assert_eq!(table.group_of(&device(1)), Some(GroupId::new(2)));
        assert!(table.members(GroupId::new(1)).is_empty());
        assert_eq!(table.groups(), vec![GroupId::new(2)]);
    }

    #[test]
    fn test_remove_member_and_group() {
        let mut table = GroupRoutingTable::new();
        table.add_member(GroupId::new(1), device(1));
        table.add_member(GroupId::new(1), device(2));

        assert_eq!(table.remove_member(&device(1)), Some(GroupId::new(1)));
        assert_eq!(table.remove_member(&device(1)), None);

        table.remove_group(GroupId::new(1));
        assert_eq!(table.group_of(&device(2)), None);
        assert!(table.groups().is_empty());
    }

    #[test]
    fn test_shared_table_reads_through_lock() {
        let shared = GroupRoutingTable::shared();
        shared.write().add_member(GroupId::new(3), device(7));
        assert_eq!(shared.group_of(&device(7)), Some(GroupId::new(3)));
    }
}
