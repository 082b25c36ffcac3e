//! Property-based tests for the control-point codec

use proptest::prelude::*;

use vcp_api::{
    decode_response, encode, ApiError, ControlCommand, ControlPointResponse, InputCommand,
    OffsetCommand, Service, VolumeCommand,
};

fn service_strategy() -> impl Strategy<Value = Service> {
    prop_oneof![
        Just(Service::VolumeControl),
        Just(Service::VolumeOffset),
        Just(Service::AudioInputControl),
    ]
}

fn volume_command_strategy() -> impl Strategy<Value = VolumeCommand> {
    prop_oneof![
        Just(VolumeCommand::VolumeDown),
        Just(VolumeCommand::VolumeUp),
        Just(VolumeCommand::UnmuteVolumeDown),
        Just(VolumeCommand::UnmuteVolumeUp),
        any::<u8>().prop_map(VolumeCommand::SetAbsoluteVolume),
        Just(VolumeCommand::Unmute),
        Just(VolumeCommand::Mute),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The change counter always travels in the second byte, right after the opcode
    #[test]
    fn prop_counter_follows_opcode(command in volume_command_strategy(), counter in any::<u8>()) {
        let command = ControlCommand::Volume(command);
        let bytes = command.encode(counter).unwrap();
        prop_assert_eq!(bytes[0], command.opcode());
        prop_assert_eq!(bytes[1], counter);
        let arguments = command.arguments();
        prop_assert_eq!(&bytes[2..], arguments.as_slice());
    }

    /// Offsets within the VOCS range always encode to four bytes
    #[test]
    fn prop_offset_in_range_encodes(offset in -255i16..=255, counter in any::<u8>()) {
        let command = ControlCommand::Offset {
            offset_id: 1,
            command: OffsetCommand::SetVolumeOffset(offset),
        };
        let bytes = command.encode(counter).unwrap();
        prop_assert_eq!(bytes.len(), 4);
        prop_assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), offset);
    }

    /// Any gain value is representable on the wire; bounds are a peer concern
    #[test]
    fn prop_set_gain_encodes(gain in any::<i8>()) {
        let command = ControlCommand::Input { input_id: 1, command: InputCommand::SetGain(gain) };
        let bytes = command.encode(0).unwrap();
        prop_assert_eq!(bytes[2] as i8, gain);
    }

    /// Opcodes above the highest assigned value are rejected on every service
    #[test]
    fn prop_high_opcodes_unsupported(service in service_strategy(), opcode in 0x07u8..=0xFF) {
        let result = encode(service, opcode, &[], 0);
        let is_unsupported = matches!(result, Err(ApiError::UnsupportedOpcode { .. }));
        prop_assert!(is_unsupported);
    }

    /// Status codes other than success and invalid-counter are rejections, never retries
    #[test]
    fn prop_other_status_is_rejection(service in service_strategy(), code in 0x01u8..=0xFF) {
        prop_assume!(code != 0x80);
        let is_rejected = matches!(
            decode_response(service, &[code]),
            ControlPointResponse::Rejected(_)
        );
        prop_assert!(is_rejected);
    }
}
