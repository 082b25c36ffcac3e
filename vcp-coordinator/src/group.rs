//! Group Coordinator
//!
//! Fans one logical command out to every eligible member of a group and
//! works out which members must follow an autonomous volume change.

use std::collections::BTreeMap;

use vcp_api::{ControlCommand, VolumeCommand, VolumeState};
use vcp_state::{DeviceId, GroupId};

use crate::error::{CoordinatorError, Result};
use crate::groups::GroupMembership;
use crate::session::DeviceSession;

/// Members of `group` that `command` can be written to
///
/// Members that are not connected or cannot take the command are left out
/// with a warning.
pub(crate) fn resolve_group_targets(
    membership: &impl GroupMembership,
    sessions: &BTreeMap<DeviceId, DeviceSession>,
    group: GroupId,
    command: &ControlCommand,
) -> Result<Vec<DeviceId>> {
    let members = membership.members(group);
    if members.is_empty() {
        return Err(CoordinatorError::UnknownGroup(group));
    }

    let mut targets = Vec::with_capacity(members.len());
    for member in members {
        let Some(session) = sessions.get(&member) else {
            tracing::warn!("Skipping {} member {}: not connected", group, member);
            continue;
        };
        if let Err(e) = session.check_command(command) {
            tracing::warn!("Skipping {} member {}: {}", group, member, e);
            continue;
        }
        targets.push(member);
    }

    if targets.is_empty() {
        return Err(CoordinatorError::InvalidTarget(format!(
            "no member of {} can take {}",
            group,
            command.instance()
        )));
    }
    Ok(targets)
}

/// Writes that bring `session` to `state`, empty when it is already there
pub(crate) fn catch_up_commands(session: &DeviceSession, state: &VolumeState) -> Vec<ControlCommand> {
    let current = &session.mirror.volume;
    let mut commands = Vec::new();
    if current.volume != state.volume {
        commands.push(ControlCommand::Volume(VolumeCommand::SetAbsoluteVolume(state.volume)));
    }
    if current.mute != state.mute {
        let command = if state.mute {
            VolumeCommand::Mute
        } else {
            VolumeCommand::Unmute
        };
        commands.push(ControlCommand::Volume(command));
    }
    commands
}

/// Group members that must follow `origin`'s autonomous volume change
///
/// `is_busy` reports members with a volume write already in flight; those
/// are left to finish what they are doing.
pub(crate) fn propagation_targets(
    membership: &impl GroupMembership,
    sessions: &BTreeMap<DeviceId, DeviceSession>,
    group: GroupId,
    origin: &DeviceId,
    state: &VolumeState,
    is_busy: impl Fn(&DeviceId) -> bool,
) -> Vec<(DeviceId, Vec<ControlCommand>)> {
    membership
        .members(group)
        .into_iter()
        .filter(|member| member != origin)
        .filter_map(|member| {
            let session = sessions.get(&member)?;
            if !session.mirror.volume.is_present() {
                return None;
            }
            if is_busy(&member) {
                tracing::debug!("Not propagating to {}: volume write in flight", member);
                return None;
            }
            let commands = catch_up_commands(session, state);
            (!commands.is_empty()).then_some((member, commands))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupRoutingTable;
    use vcp_api::InputCommand;
    use vcp_state::{DeviceMirror, VolumeControlHandles, VolumeControlState};

    fn device(n: u8) -> DeviceId {
        DeviceId::new(format!("aa:bb:cc:dd:ee:{:02x}", n))
    }

    fn session(n: u8, volume: u8, mute: bool) -> (DeviceId, DeviceSession) {
        let mut state = VolumeControlState::new(VolumeControlHandles {
            state: 0x12,
            state_ccc: 0x13,
            control_point: 0x15,
            ..Default::default()
        });
        state.volume = volume;
        state.mute = mute;
        (device(n), DeviceSession::new(DeviceMirror::new(device(n), state)))
    }

    fn table(members: &[u8]) -> GroupRoutingTable {
        let mut table = GroupRoutingTable::new();
        for n in members {
            table.add_member(GroupId::new(1), device(*n));
        }
        table
    }

    #[test]
    fn test_unknown_group() {
        let result = resolve_group_targets(
            &table(&[]),
            &BTreeMap::new(),
            GroupId::new(1),
            &VolumeCommand::Mute.into(),
        );
        assert!(matches!(result, Err(CoordinatorError::UnknownGroup(_))));
    }

    #[tokio::test]
    async fn test_disconnected_members_excluded() {
        let sessions: BTreeMap<_, _> = [session(1, 10, false)].into_iter().collect();
        let targets = resolve_group_targets(
            &table(&[1, 2]),
            &sessions,
            GroupId::new(1),
            &VolumeCommand::Mute.into(),
        )
        .unwrap();
        assert_eq!(targets, vec![device(1)]);
    }

    #[tokio::test]
    async fn test_no_eligible_member() {
        let sessions: BTreeMap<_, _> = [session(1, 10, false)].into_iter().collect();
        let command = ControlCommand::Input {
            input_id: 1,
            command: InputCommand::Mute,
        };
        let result = resolve_group_targets(&table(&[1, 2]), &sessions, GroupId::new(1), &command);
        assert!(matches!(result, Err(CoordinatorError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_propagation_skips_origin_busy_and_settled_members() {
        let sessions: BTreeMap<_, _> = [
            session(1, 10, false),
            session(2, 10, false),
            session(3, 50, false),
            session(4, 20, false),
        ]
        .into_iter()
        .collect();
        let state = VolumeState {
            volume: 50,
            mute: true,
            change_counter: 3,
        };

        let targets = propagation_targets(
            &table(&[1, 2, 3, 4]),
            &sessions,
            GroupId::new(1),
            &device(1),
            &state,
            |member| *member == device(4),
        );

        assert_eq!(
            targets,
            vec![
                (
                    device(2),
                    vec![
                        ControlCommand::Volume(VolumeCommand::SetAbsoluteVolume(50)),
                        ControlCommand::Volume(VolumeCommand::Mute),
                    ]
                ),
                (device(3), vec![ControlCommand::Volume(VolumeCommand::Mute)]),
            ]
        );
    }
}
