//! Background dispatch worker
//!
//! Spawns a thread with its own single-threaded tokio runtime that owns the
//! [`Coordinator`]. Host requests, GATT results and deadline expiries all
//! arrive over channels and are handled one at a time in the select loop,
//! which is what makes the coordinator the single writer of its state.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use vcp_api::{AudioLocation, ControlCommand};
use vcp_state::{DeviceId, DeviceMirror};

use crate::config::CoordinatorConfig;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::event::CoordinatorEvent;
use crate::gatt::{GattClient, GattEvent};
use crate::groups::GroupMembership;
use crate::operation::{OperationId, Target};
use crate::timeout::{SupervisorStats, TimeoutSupervisor};

/// Requests sent from the sync handle to the worker
#[derive(Debug)]
pub enum Command {
    AddDevice {
        mirror: DeviceMirror,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveDevice {
        device: DeviceId,
        reply: oneshot::Sender<bool>,
    },
    Execute {
        target: Target,
        command: ControlCommand,
        reply: oneshot::Sender<Result<OperationId>>,
    },
    Cancel {
        id: OperationId,
        reply: oneshot::Sender<bool>,
    },
    SetOffsetLocation {
        device: DeviceId,
        offset_id: u8,
        location: AudioLocation,
        reply: oneshot::Sender<Result<()>>,
    },
    SetOffsetDescription {
        device: DeviceId,
        offset_id: u8,
        description: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetInputDescription {
        device: DeviceId,
        input_id: u8,
        description: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RefreshVolume {
        device: DeviceId,
        reply: oneshot::Sender<Result<()>>,
    },
    RefreshOffset {
        device: DeviceId,
        offset_id: u8,
        reply: oneshot::Sender<Result<()>>,
    },
    RefreshInput {
        device: DeviceId,
        input_id: u8,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Snapshot of one device's mirror
    Mirror {
        device: DeviceId,
        reply: oneshot::Sender<Option<DeviceMirror>>,
    },
    Dump {
        reply: oneshot::Sender<String>,
    },
    /// Result or unsolicited traffic from the GATT layer
    Gatt(GattEvent),
    /// Cancel everything in flight; replies with the number canceled
    Teardown {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Spawns the background dispatch worker thread
///
/// The worker owns its own tokio runtime, the coordinator and the deadline
/// timers. It runs until [`Command::Shutdown`] arrives or every command
/// sender is dropped; either way in-flight operations are canceled first.
pub fn spawn_dispatch_worker<G, M>(
    config: CoordinatorConfig,
    gatt: G,
    groups: M,
    command_rx: tokio_mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<CoordinatorEvent>,
    stats: SupervisorStats,
) -> JoinHandle<()>
where
    G: GattClient + 'static,
    M: GroupMembership + 'static,
{
    thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Failed to create tokio runtime for dispatch worker: {}", e);
                return;
            }
        };

        rt.block_on(run_dispatch_loop(
            config, gatt, groups, command_rx, event_tx, stats,
        ));
    })
}

async fn run_dispatch_loop<G: GattClient, M: GroupMembership>(
    config: CoordinatorConfig,
    gatt: G,
    groups: M,
    mut command_rx: tokio_mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<CoordinatorEvent>,
    stats: SupervisorStats,
) {
    let (expiry_tx, mut expiry_rx) = tokio_mpsc::unbounded_channel();
    let supervisor = TimeoutSupervisor::with_stats(expiry_tx, stats);
    let mut coordinator = Coordinator::new(config, gatt, groups, supervisor, event_tx);

    tracing::info!("Dispatch worker started");

    loop {
        tokio::select! {
            Some(id) = expiry_rx.recv() => {
                coordinator.on_timer_expired(id);
            }

            command = command_rx.recv() => {
                let Some(command) = command else {
                    tracing::debug!("All handles dropped, shutting down dispatch worker");
                    break;
                };
                if !handle_command(&mut coordinator, command) {
                    tracing::info!("Dispatch worker received shutdown command");
                    break;
                }
            }
        }
    }

    coordinator.teardown();
    tracing::info!("Dispatch worker shut down");
}

/// Apply one command; returns false on shutdown
fn handle_command<G: GattClient, M: GroupMembership>(
    coordinator: &mut Coordinator<G, M>,
    command: Command,
) -> bool {
    // A dropped reply receiver only means the caller stopped waiting
    match command {
        Command::AddDevice { mirror, reply } => {
            let _ = reply.send(coordinator.add_device(mirror));
        }
        Command::RemoveDevice { device, reply } => {
            let _ = reply.send(coordinator.remove_device(&device));
        }
        Command::Execute {
            target,
            command,
            reply,
        } => {
            let result = coordinator.execute(target, command);
            if let Err(e) = &result {
                tracing::warn!("Rejected {} command: {}", command.instance(), e);
            }
            let _ = reply.send(result);
        }
        Command::Cancel { id, reply } => {
            let _ = reply.send(coordinator.cancel(id));
        }
        Command::SetOffsetLocation {
            device,
            offset_id,
            location,
            reply,
        } => {
            let _ = reply.send(coordinator.set_offset_location(&device, offset_id, location));
        }
        Command::SetOffsetDescription {
            device,
            offset_id,
            description,
            reply,
        } => {
            let _ = reply.send(coordinator.set_offset_description(
                &device,
                offset_id,
                &description,
            ));
        }
        Command::SetInputDescription {
            device,
            input_id,
            description,
            reply,
        } => {
            let _ = reply.send(coordinator.set_input_description(&device, input_id, &description));
        }
        Command::RefreshVolume { device, reply } => {
            let _ = reply.send(coordinator.refresh_volume(&device));
        }
        Command::RefreshOffset {
            device,
            offset_id,
            reply,
        } => {
            let _ = reply.send(coordinator.refresh_offset(&device, offset_id));
        }
        Command::RefreshInput {
            device,
            input_id,
            reply,
        } => {
            let _ = reply.send(coordinator.refresh_input(&device, input_id));
        }
        Command::Mirror { device, reply } => {
            let _ = reply.send(coordinator.mirror(&device).cloned());
        }
        Command::Dump { reply } => {
            let _ = reply.send(coordinator.dump());
        }
        Command::Gatt(event) => coordinator.handle_gatt_event(event),
        Command::Teardown { reply } => {
            let _ = reply.send(coordinator.teardown());
        }
        Command::Shutdown => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::MockGattClient;
    use crate::groups::GroupRoutingTable;
    use std::time::Duration;

    #[test]
    fn test_command_debug() {
        let cmd = Command::Gatt(GattEvent::Disconnected {
            device: DeviceId::new("aa:bb:cc:dd:ee:01"),
        });
        assert!(format!("{:?}", cmd).contains("Disconnected"));
    }

    #[test]
    fn test_worker_stops_when_handles_drop() {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (event_tx, _event_rx) = mpsc::channel();
        let worker = spawn_dispatch_worker(
            CoordinatorConfig::default(),
            MockGattClient::new(),
            GroupRoutingTable::new(),
            command_rx,
            event_tx,
            SupervisorStats::new(),
        );

        let (reply, reply_rx) = oneshot::channel();
        command_tx.send(Command::Dump { reply }).unwrap();
        let dump = reply_rx.blocking_recv().unwrap();
        assert!(dump.starts_with("coordinator: 0 device(s)"));

        drop(command_tx);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !worker.is_finished() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished());
    }
}
