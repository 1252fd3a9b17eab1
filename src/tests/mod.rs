//! Integration tests for PDU framing and end-to-end gateway behaviour

mod gateway;

use crate::codec::{CodecError, Encodable, Frame};
use crate::datatypes::*;
use bytes::Bytes;
use std::io::Cursor;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_frame_check_insufficient_data() {
        let data = vec![0x00, 0x00]; // Only 2 bytes
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor);
        assert!(matches!(result, Err(CodecError::Incomplete)));
    }

    #[test]
    fn test_frame_check_invalid_length() {
        let data = vec![
            0x00, 0x00, 0x00, 0x05, // command_length = 5 (too small)
            0x00, 0x00, 0x00, 0x15, // command_id
            0x00, 0x00, 0x00, 0x00, // command_status
            0x00, 0x00, 0x00, 0x01, // sequence_number
        ];
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor);
        assert!(matches!(result, Err(CodecError::InvalidPduLength { length: 5, .. })));
    }

    #[test]
    fn test_frame_check_length_too_large() {
        let data = vec![
            0xFF, 0xFF, 0xFF, 0xFF, // command_length = max u32
            0x00, 0x00, 0x00, 0x15, // command_id
            0x00, 0x00, 0x00, 0x00, // command_status
            0x00, 0x00, 0x00, 0x01, // sequence_number
        ];
        let mut cursor = Cursor::new(data.as_slice());

        let result = Frame::check(&mut cursor);
        assert!(matches!(result, Err(CodecError::InvalidPduLength { .. })));
    }

    #[test]
    fn test_bind_transmitter_max_field_lengths() {
        // Maximum allowed field lengths per SMPP v3.4
        let mut bind_transmitter = BindTransmitter::new(1, "A".repeat(15), "B".repeat(8));
        bind_transmitter.system_type = "C".repeat(12);
        bind_transmitter.address_range = "D".repeat(40);

        let bytes = bind_transmitter.to_bytes().unwrap();
        assert!(bytes.len() > 16);

        let mut cursor = Cursor::new(bytes.as_ref());
        let frame = Frame::parse(&mut cursor).unwrap();
        assert_eq!(frame, Frame::BindTransmitter(bind_transmitter));
    }

    #[test]
    fn test_bind_transmitter_system_id_too_long() {
        let bind_transmitter = BindTransmitter::new(1, "A".repeat(16), "secret");
        let err = bind_transmitter.to_bytes().unwrap_err();
        assert!(matches!(
            err,
            CodecError::FieldValidation {
                field: "system_id",
                ..
            }
        ));
    }

    #[test]
    fn test_submit_sm_zero_length_message() {
        let submit_sm = SubmitSm::builder()
            .source_addr("1234567890")
            .destination_addr("0987654321")
            .build();

        let bytes = submit_sm.to_bytes().unwrap();

        // sm_length is the last octet when there is no user data and no TLV
        assert_eq!(bytes[bytes.len() - 1], 0);

        let mut cursor = Cursor::new(bytes.as_ref());
        match Frame::parse(&mut cursor).unwrap() {
            Frame::SubmitSm(decoded) => assert!(decoded.short_message.is_empty()),
            other => panic!("expected submit_sm, got {other:?}"),
        }
    }

    #[test]
    fn test_submit_sm_length_mismatch() {
        let submit_sm = SubmitSm::builder()
            .destination_addr("0987654321")
            .short_message(Bytes::from_static(b"Hello"))
            .build();
        let mut bytes = submit_sm.to_bytes().unwrap().to_vec();

        // Claim more user data than the PDU carries
        let sm_length_at = bytes.len() - 6;
        bytes[sm_length_at] = 50;

        let mut cursor = Cursor::new(bytes.as_slice());
        assert!(matches!(
            Frame::parse(&mut cursor),
            Err(CodecError::FieldValidation { .. })
        ));
    }

    #[test]
    fn test_unicode_string_handling() {
        let bind_transmitter = BindTransmitter::new(1, "SMPP测试", "密码");

        let bytes = bind_transmitter.to_bytes().unwrap();
        assert!(bytes.len() > 16);
        assert!(
            bytes
                .windows("SMPP测试".len())
                .any(|window| window == "SMPP测试".as_bytes())
        );
    }

    #[test]
    fn test_boundary_sequence_numbers() {
        for seq_num in [1, 0x7FFFFFFF, 0xFFFFFFFE] {
            let bytes = SubmitSmResponse::new(seq_num, "test").to_bytes().unwrap();
            assert_eq!(&bytes[12..16], &seq_num.to_be_bytes());

            let mut cursor = Cursor::new(bytes.as_ref());
            assert_eq!(Frame::parse(&mut cursor).unwrap().sequence_number(), seq_num);
        }
    }

    #[test]
    fn test_reserved_sequence_number_rejected() {
        let bytes = SubmitSmResponse::new(0xFFFFFFFF, "test").to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        assert!(matches!(
            Frame::parse(&mut cursor),
            Err(CodecError::ReservedSequenceNumber(0xFFFFFFFF))
        ));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut stream = EnquireLink::new(7).to_bytes().unwrap().to_vec();
        stream.extend_from_slice(&Unbind::new(8).to_bytes().unwrap());

        let mut cursor = Cursor::new(stream.as_slice());
        assert_eq!(Frame::parse(&mut cursor).unwrap(), Frame::EnquireLink(EnquireLink::new(7)));
        assert_eq!(Frame::parse(&mut cursor).unwrap(), Frame::Unbind(Unbind::new(8)));
        assert_eq!(cursor.position() as usize, stream.len());
    }
}
