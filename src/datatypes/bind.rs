use crate::codec::CodecError;
use crate::datatypes::CommandId;
use crate::macros::impl_bind_pdu;

// SMPP v3.4 specification field length limits (excluding null terminator)
pub const MAX_SYSTEM_ID_LENGTH: usize = 15;
pub const MAX_PASSWORD_LENGTH: usize = 8;
pub const MAX_SYSTEM_TYPE_LENGTH: usize = 12;
pub const MAX_ADDRESS_RANGE_LENGTH: usize = 40;

#[derive(Debug, thiserror::Error)]
pub enum BindValidationError {
    #[error("system_id exceeds maximum length of {MAX_SYSTEM_ID_LENGTH} characters ({} with null terminator): {actual}", MAX_SYSTEM_ID_LENGTH + 1)]
    SystemIdTooLong { actual: usize },

    #[error("password exceeds maximum length of {MAX_PASSWORD_LENGTH} characters ({} with null terminator): {actual}", MAX_PASSWORD_LENGTH + 1)]
    PasswordTooLong { actual: usize },

    #[error("system_type exceeds maximum length of {MAX_SYSTEM_TYPE_LENGTH} characters ({} with null terminator): {actual}", MAX_SYSTEM_TYPE_LENGTH + 1)]
    SystemTypeTooLong { actual: usize },

    #[error("address_range exceeds maximum length of {MAX_ADDRESS_RANGE_LENGTH} characters ({} with null terminator): {actual}", MAX_ADDRESS_RANGE_LENGTH + 1)]
    AddressRangeTooLong { actual: usize },
}

impl BindValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            BindValidationError::SystemIdTooLong { .. } => "system_id",
            BindValidationError::PasswordTooLong { .. } => "password",
            BindValidationError::SystemTypeTooLong { .. } => "system_type",
            BindValidationError::AddressRangeTooLong { .. } => "address_range",
        }
    }
}

impl From<BindValidationError> for CodecError {
    fn from(err: BindValidationError) -> Self {
        CodecError::FieldValidation {
            field: err.field(),
            reason: err.to_string(),
        }
    }
}

pub(crate) fn validate_bind_fields(
    system_id: &str,
    password: Option<&str>,
    system_type: &str,
    address_range: &str,
) -> Result<(), BindValidationError> {
    if system_id.len() > MAX_SYSTEM_ID_LENGTH {
        return Err(BindValidationError::SystemIdTooLong {
            actual: system_id.len(),
        });
    }

    if let Some(password) = password {
        if password.len() > MAX_PASSWORD_LENGTH {
            return Err(BindValidationError::PasswordTooLong {
                actual: password.len(),
            });
        }
    }

    if system_type.len() > MAX_SYSTEM_TYPE_LENGTH {
        return Err(BindValidationError::SystemTypeTooLong {
            actual: system_type.len(),
        });
    }

    if address_range.len() > MAX_ADDRESS_RANGE_LENGTH {
        return Err(BindValidationError::AddressRangeTooLong {
            actual: address_range.len(),
        });
    }

    Ok(())
}

impl_bind_pdu! {
    /// BindTransmitter is used to bind a transmitter ESME to the SMSC.
    BindTransmitter => CommandId::BindTransmitter,
    BindTransmitterResponse => CommandId::BindTransmitterResp,
}

impl_bind_pdu! {
    /// BindReceiver registers an ESME that only receives deliver_sm PDUs.
    BindReceiver => CommandId::BindReceiver,
    BindReceiverResponse => CommandId::BindReceiverResp,
}

impl_bind_pdu! {
    /// BindTransceiver registers an ESME for both submission and delivery on
    /// a single connection.
    BindTransceiver => CommandId::BindTransceiver,
    BindTransceiverResponse => CommandId::BindTransceiverResp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Decodable, Encodable, PduHeader};
    use crate::datatypes::{
        CommandStatus, InterfaceVersion, NumericPlanIndicator, Tlv, TypeOfNumber, tags,
    };
    use bytes::Bytes;
    use std::io::Cursor;

    fn sample_bind_transmitter() -> BindTransmitter {
        BindTransmitter {
            command_status: CommandStatus::Ok,
            sequence_number: 1,
            system_id: "SMPP3TEST".to_string(),
            password: Some("secret08".to_string()),
            system_type: "SUBMIT1".to_string(),
            interface_version: InterfaceVersion::SmppV34,
            addr_ton: TypeOfNumber::International,
            addr_npi: NumericPlanIndicator::Isdn,
            address_range: "".to_string(),
        }
    }

    #[test]
    fn bind_transmitter_to_bytes() {
        let bt_bytes = sample_bind_transmitter().to_bytes().unwrap();

        // Expected byte representation of a bind transmitter
        let expected: Vec<u8> = vec![
            // Header:
            0x00, 0x00, 0x00, 0x2F, // command_length
            0x00, 0x00, 0x00, 0x02, // command_id
            0x00, 0x00, 0x00, 0x00, // command_status
            0x00, 0x00, 0x00, 0x01, // sequence_number
            // Body:
            0x53, 0x4D, 0x50, 0x50, 0x33, 0x54, 0x45, 0x53, 0x54, 0x00, // system_id
            0x73, 0x65, 0x63, 0x72, 0x65, 0x74, 0x30, 0x38, 0x00, // password
            0x53, 0x55, 0x42, 0x4D, 0x49, 0x54, 0x31, 0x00, // system_type
            0x34, // interface_version
            0x01, // addr_ton
            0x01, // addr_npi
            0x00, // address_range
        ];

        assert_eq!(bt_bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn bind_transceiver_without_password_sends_null() {
        let bind = BindTransceiver::new(9, "gateway", "");
        assert_eq!(bind.password, None);

        let bytes = bind.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], &[0x00, 0x00, 0x00, 0x09]);
        // system_id "gateway\0" then empty password "\0" then empty system_type "\0"
        assert_eq!(&bytes[16..24], b"gateway\0");
        assert_eq!(bytes[24], 0x00);
        assert_eq!(bytes[25], 0x00);
        assert_eq!(bytes.len(), 16 + 8 + 1 + 1 + 3 + 1);
    }

    #[test]
    fn bind_receiver_decodes_what_it_encodes() {
        let mut original = BindReceiver::new(5, "rx", "pw");
        original.address_range = "^44".to_string();
        let bytes = original.to_bytes().unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = BindReceiver::decode(header, &mut cursor).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn bind_transmitter_field_length_validation() {
        let mut bind = sample_bind_transmitter();
        bind.system_id = "A".repeat(16);
        assert!(matches!(
            bind.validate(),
            Err(BindValidationError::SystemIdTooLong { actual: 16 })
        ));

        let mut bind = sample_bind_transmitter();
        bind.password = Some("A".repeat(9));
        assert!(matches!(
            bind.validate(),
            Err(BindValidationError::PasswordTooLong { .. })
        ));

        // Encoding refuses the PDU instead of truncating credentials
        let err = bind.to_bytes().unwrap_err();
        assert!(matches!(
            err,
            CodecError::FieldValidation {
                field: "password",
                ..
            }
        ));
    }

    #[test]
    fn bind_transmitter_max_valid_lengths() {
        let bind = BindTransmitter {
            system_id: "A".repeat(15),
            password: Some("B".repeat(8)),
            system_type: "C".repeat(12),
            address_range: "D".repeat(40),
            ..sample_bind_transmitter()
        };
        assert!(bind.validate().is_ok());
        assert_eq!(bind.to_bytes().unwrap().len(), 16 + 16 + 9 + 13 + 3 + 41);
    }

    #[test]
    fn bind_transmitter_response_to_bytes_no_tlv() {
        let bytes = BindTransmitterResponse::new(1, "SMPP3TEST").to_bytes().unwrap();

        let expected: Vec<u8> = vec![
            0x00, 0x00, 0x00, 0x1A, // command_length (26 bytes total)
            0x80, 0x00, 0x00, 0x02, // command_id (BindTransmitterResp = 0x80000002)
            0x00, 0x00, 0x00, 0x00, // command_status
            0x00, 0x00, 0x00, 0x01, // sequence_number
            0x53, 0x4D, 0x50, 0x50, 0x33, 0x54, 0x45, 0x53, 0x54,
            0x00, // system_id "SMPP3TEST\0"
        ];

        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn bind_response_with_sc_interface_version() {
        let mut response = BindTransceiverResponse::new(3, "SMSC");
        response.sc_interface_version =
            Some(Tlv::new(tags::SC_INTERFACE_VERSION, Bytes::from_static(&[0x34])));
        let bytes = response.to_bytes().unwrap();

        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = BindTransceiverResponse::decode(header, &mut cursor).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn rejected_bind_response_without_body() {
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x10, // command_length
            0x80, 0x00, 0x00, 0x09, // bind_transceiver_resp
            0x00, 0x00, 0x00, 0x0E, // ESME_RINVPASWD
            0x00, 0x00, 0x00, 0x01, // sequence_number
        ];
        let mut cursor = Cursor::new(data);
        let header = PduHeader::decode(&mut cursor).unwrap();
        let decoded = BindTransceiverResponse::decode(header, &mut cursor).unwrap();
        assert_eq!(decoded.command_status, CommandStatus::InvalidPassword);
        assert!(decoded.system_id.is_empty());
    }

    #[test]
    fn bind_response_decoder_rejects_other_command() {
        let bytes = BindReceiverResponse::new(2, "SMSC").to_bytes().unwrap();
        let mut cursor = Cursor::new(bytes.as_ref());
        let header = PduHeader::decode(&mut cursor).unwrap();
        let result = BindTransmitterResponse::decode(header, &mut cursor);
        assert!(matches!(result, Err(CodecError::UnexpectedCommandId { .. })));
    }
}
