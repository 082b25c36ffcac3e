//! Identity types for vcp-state

mod device_id;
mod group_id;

pub use device_id::DeviceId;
pub use group_id::GroupId;
