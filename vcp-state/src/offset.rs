//! Volume Offset Control Service instances of one device

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use vcp_api::{AudioLocation, Characteristic, OffsetState};

use crate::error::{Result, StateError};
use crate::Handle;

/// Attribute handles of one Volume Offset Control Service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeOffsetHandles {
    pub service: Handle,
    pub state: Handle,
    pub state_ccc: Handle,
    pub location: Handle,
    pub location_ccc: Handle,
    pub description: Handle,
    pub description_ccc: Handle,
    pub control_point: Handle,
}

impl VolumeOffsetHandles {
    pub fn characteristic_for(&self, handle: Handle) -> Option<Characteristic> {
        if handle == 0 {
            return None;
        }
        let table = [
            (self.state, Characteristic::VolumeOffsetState),
            (self.location, Characteristic::AudioLocation),
            (self.description, Characteristic::AudioOutputDescription),
            (self.control_point, Characteristic::VolumeOffsetControlPoint),
        ];
        table
            .into_iter()
            .find(|(value, _)| *value == handle)
            .map(|(_, characteristic)| characteristic)
    }

    pub fn notification_handles(&self) -> Vec<Handle> {
        [
            (self.state, self.state_ccc),
            (self.location, self.location_ccc),
            (self.description, self.description_ccc),
        ]
        .into_iter()
        .filter(|(value, ccc)| *value != 0 && *ccc != 0)
        .map(|(value, _)| value)
        .collect()
    }
}

/// Last-known state of one volume offset (one audio output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOffset {
    pub id: u8,
    pub change_counter: u8,
    pub offset: i16,
    pub location: AudioLocation,
    pub description: String,
    pub location_writable: bool,
    pub description_writable: bool,
    pub handles: VolumeOffsetHandles,
}

impl VolumeOffset {
    pub fn new(id: u8, handles: VolumeOffsetHandles) -> Self {
        Self {
            id,
            change_counter: 0,
            offset: 0,
            location: AudioLocation::default(),
            description: String::new(),
            location_writable: false,
            description_writable: false,
            handles,
        }
    }

    pub fn apply_state(&mut self, state: &OffsetState) {
        self.change_counter = state.change_counter;
        self.offset = state.offset;
    }

    pub fn state(&self) -> OffsetState {
        OffsetState {
            offset: self.offset,
            change_counter: self.change_counter,
        }
    }
}

impl fmt::Display for VolumeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offset#{}: offset={} location=0x{:08x} counter={} desc={:?}",
            self.id, self.offset, self.location.0, self.change_counter, self.description
        )
    }
}

/// Ordered volume offsets of one device
#[derive(Debug, Clone, Default)]
pub struct VolumeOffsets {
    offsets: Vec<VolumeOffset>,
    by_service_handle: HashMap<Handle, usize>,
}

impl VolumeOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discovered offset and return its id
    pub fn add(&mut self, handles: VolumeOffsetHandles) -> Result<u8> {
        if handles.service != 0 {
            if let Some(&index) = self.by_service_handle.get(&handles.service) {
                return Ok(self.offsets[index].id);
            }
        }
        let id = u8::try_from(self.offsets.len() + 1)
            .map_err(|_| StateError::TooManyInstances("volume offset"))?;
        // 0 means the service handle was not discovered; never dedup on it
        if handles.service != 0 {
            self.by_service_handle.insert(handles.service, self.offsets.len());
        }
        self.offsets.push(VolumeOffset::new(id, handles));
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VolumeOffset> {
        self.offsets.iter()
    }

    pub fn find_by_id(&self, id: u8) -> Option<&VolumeOffset> {
        self.offsets.iter().find(|offset| offset.id == id)
    }

    pub fn find_by_id_mut(&mut self, id: u8) -> Option<&mut VolumeOffset> {
        self.offsets.iter_mut().find(|offset| offset.id == id)
    }

    /// First offset whose location bitmask equals `location`
    pub fn find_by_location(&self, location: AudioLocation) -> Option<&VolumeOffset> {
        self.offsets.iter().find(|offset| offset.location == location)
    }

    pub fn find_by_service_handle(&self, service: Handle) -> Option<&VolumeOffset> {
        self.by_service_handle
            .get(&service)
            .and_then(|&index| self.offsets.get(index))
    }

    pub fn find_by_handle(&self, handle: Handle) -> Option<&VolumeOffset> {
        self.offsets
            .iter()
            .find(|offset| offset.handles.characteristic_for(handle).is_some())
    }

    pub fn notification_handles(&self) -> Vec<Handle> {
        self.offsets
            .iter()
            .flat_map(|offset| offset.handles.notification_handles())
            .collect()
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.by_service_handle.clear();
    }
}

impl fmt::Display for VolumeOffsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "volume offsets: {}", self.offsets.len())?;
        for offset in &self.offsets {
            writeln!(f, "  {}", offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn handles(base: Handle) -> VolumeOffsetHandles {
        VolumeOffsetHandles {
            service: base,
            state: base + 2,
            state_ccc: base + 3,
            location: base + 5,
            location_ccc: base + 6,
            description: base + 8,
            description_ccc: base + 9,
            control_point: base + 11,
        }
    }

    fn offsets() -> VolumeOffsets {
        let mut offsets = VolumeOffsets::new();
        offsets.add(handles(0x30)).unwrap();
        offsets.add(handles(0x50)).unwrap();
        offsets.find_by_id_mut(1).unwrap().location = AudioLocation::FRONT_LEFT;
        offsets.find_by_id_mut(2).unwrap().location = AudioLocation::FRONT_RIGHT;
        offsets
    }

    #[rstest]
    #[case(0x32, Some(1))]
    #[case(0x35, Some(1))]
    #[case(0x3B, Some(1))]
    #[case(0x58, Some(2))]
    #[case(0x33, None)]
    #[case(0, None)]
    fn test_find_by_handle(#[case] handle: Handle, #[case] expected: Option<u8>) {
        assert_eq!(offsets().find_by_handle(handle).map(|o| o.id), expected);
    }

    #[test]
    fn test_unset_service_handle_gets_fresh_id() {
        let mut offsets = VolumeOffsets::new();
        let unset = VolumeOffsetHandles {
            service: 0,
            ..handles(0x30)
        };
        assert_eq!(offsets.add(unset).unwrap(), 1);
        assert_eq!(offsets.add(unset).unwrap(), 2);
        assert_eq!(offsets.add(handles(0x50)).unwrap(), 3);
        assert_eq!(offsets.add(handles(0x50)).unwrap(), 3);
    }

    #[test]
    fn test_find_by_location() {
        let offsets = offsets();
        assert_eq!(offsets.find_by_location(AudioLocation::FRONT_RIGHT).unwrap().id, 2);
        assert!(offsets.find_by_location(AudioLocation::FRONT_CENTER).is_none());
    }

    #[test]
    fn test_apply_state() {
        let mut offset = VolumeOffset::new(1, handles(0x30));
        offset.apply_state(&OffsetState {
            offset: -20,
            change_counter: 9,
        });
        assert_eq!(offset.state(), OffsetState { offset: -20, change_counter: 9 });
    }

    #[test]
    fn test_display_dump() {
        let dump = offsets().to_string();
        assert!(dump.starts_with("volume offsets: 2"));
        assert!(dump.contains("offset#2: offset=0 location=0x00000002"));
    }
}
