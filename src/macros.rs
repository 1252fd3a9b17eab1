// ABOUTME: This module provides macros to reduce boilerplate in SMPP PDU implementations
// ABOUTME: Includes macros for header-only PDUs, the bind family, short message PDUs and builders

/// Macro for implementing codec traits on header-only PDUs (no body)
///
/// This macro generates complete Encodable/Decodable implementations for PDUs
/// that only contain the standard SMPP header with no body content.
///
/// # Arguments
/// * `$pdu_type` - The PDU struct name (e.g., EnquireLink)
/// * `$command_id` - The CommandId variant (e.g., CommandId::EnquireLink)
macro_rules! impl_header_only_pdu {
    ($pdu_type:ident, $command_id:expr) => {
        impl $crate::codec::Decodable for $pdu_type {
            fn command_id() -> $crate::datatypes::CommandId {
                $command_id
            }

            fn decode(
                header: $crate::codec::PduHeader,
                buf: &mut std::io::Cursor<&[u8]>,
            ) -> Result<Self, $crate::codec::CodecError> {
                use bytes::Buf;

                Self::validate_header(&header)?;

                // Header-only PDUs should have no body
                if buf.has_remaining() {
                    return Err($crate::codec::CodecError::FieldValidation {
                        field: concat!(stringify!($pdu_type), "_body"),
                        reason: concat!(stringify!($pdu_type), " PDU should have no body")
                            .to_string(),
                    });
                }

                Ok($pdu_type {
                    command_status: header.command_status,
                    sequence_number: header.sequence_number,
                })
            }
        }

        impl $crate::codec::Encodable for $pdu_type {
            fn encode(&self, buf: &mut bytes::BytesMut) -> Result<(), $crate::codec::CodecError> {
                let header = $crate::codec::PduHeader {
                    command_length: $crate::codec::PduHeader::SIZE as u32,
                    command_id: $command_id,
                    command_status: self.command_status,
                    sequence_number: self.sequence_number,
                };
                header.encode(buf)
            }

            fn encoded_size(&self) -> usize {
                $crate::codec::PduHeader::SIZE
            }
        }
    };
}

/// Macro for generating builder setter methods
///
/// Each generated method takes a value, sets the corresponding field,
/// and returns self for method chaining.
macro_rules! builder_setters {
    ($($field:ident: $type:ty),* $(,)?) => {
        $(
            pub fn $field(mut self, $field: $type) -> Self {
                self.$field = $field;
                self
            }
        )*
    };
}

/// Macro for generating constructor methods for header-only PDUs
///
/// - `new(sequence_number: u32)` - Creates PDU with Ok status
/// - `error(sequence_number: u32, status: CommandStatus)` - Creates PDU with error status
macro_rules! impl_header_only_constructors {
    ($pdu_type:ident) => {
        impl $pdu_type {
            /// Create a new PDU with Ok status
            pub fn new(sequence_number: u32) -> Self {
                Self {
                    command_status: $crate::datatypes::CommandStatus::Ok,
                    sequence_number,
                }
            }

            /// Create a PDU with error status
            pub fn error(sequence_number: u32, status: $crate::datatypes::CommandStatus) -> Self {
                Self {
                    command_status: status,
                    sequence_number,
                }
            }
        }
    };
}

/// Codec implementation plus `new`/`error` constructors for a header-only PDU.
macro_rules! impl_complete_header_only_pdu {
    ($pdu_type:ident, $command_id:expr) => {
        $crate::macros::impl_header_only_pdu!($pdu_type, $command_id);
        $crate::macros::impl_header_only_constructors!($pdu_type);
    };
}

/// Macro defining one member of the bind family (bind_transmitter,
/// bind_receiver, bind_transceiver) together with its response.
///
/// All three requests share the same body layout (SMPP v3.4 section 4.1) and all
/// three responses carry `system_id` plus the optional `sc_interface_version`
/// TLV, so the structs and their codecs are generated from one template.
macro_rules! impl_bind_pdu {
    (
        $(#[$request_doc:meta])*
        $request:ident => $request_id:expr,
        $(#[$response_doc:meta])*
        $response:ident => $response_id:expr $(,)?
    ) => {
        $(#[$request_doc])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $request {
            pub command_status: $crate::datatypes::CommandStatus,
            pub sequence_number: u32,
            /// Identification of the ESME requesting to bind (max 15 octets).
            pub system_id: String,
            /// Authentication password (max 8 octets); sent as NULL when absent.
            pub password: Option<String>,
            /// Category of the ESME (max 12 octets).
            pub system_type: String,
            pub interface_version: $crate::datatypes::InterfaceVersion,
            pub addr_ton: $crate::datatypes::TypeOfNumber,
            pub addr_npi: $crate::datatypes::NumericPlanIndicator,
            /// Range of SME addresses served by the ESME (max 40 octets).
            pub address_range: String,
        }

        $(#[$response_doc])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $response {
            pub command_status: $crate::datatypes::CommandStatus,
            pub sequence_number: u32,
            /// SMSC identifier; absent when the bind was rejected.
            pub system_id: String,
            pub sc_interface_version: Option<$crate::datatypes::Tlv>,
        }

        impl $request {
            pub fn new(
                sequence_number: u32,
                system_id: impl Into<String>,
                password: impl Into<String>,
            ) -> Self {
                let password = password.into();
                Self {
                    command_status: $crate::datatypes::CommandStatus::Ok,
                    sequence_number,
                    system_id: system_id.into(),
                    password: (!password.is_empty()).then_some(password),
                    system_type: String::new(),
                    interface_version: $crate::datatypes::InterfaceVersion::SmppV34,
                    addr_ton: $crate::datatypes::TypeOfNumber::Unknown,
                    addr_npi: $crate::datatypes::NumericPlanIndicator::Unknown,
                    address_range: String::new(),
                }
            }

            /// Validates field lengths according to SMPP v3.4
            pub fn validate(&self) -> Result<(), $crate::datatypes::BindValidationError> {
                $crate::datatypes::validate_bind_fields(
                    &self.system_id,
                    self.password.as_deref(),
                    &self.system_type,
                    &self.address_range,
                )
            }
        }

        impl $response {
            pub fn new(sequence_number: u32, system_id: impl Into<String>) -> Self {
                Self {
                    command_status: $crate::datatypes::CommandStatus::Ok,
                    sequence_number,
                    system_id: system_id.into(),
                    sc_interface_version: None,
                }
            }

            pub fn error(sequence_number: u32, status: $crate::datatypes::CommandStatus) -> Self {
                Self {
                    command_status: status,
                    sequence_number,
                    system_id: String::new(),
                    sc_interface_version: None,
                }
            }
        }

        impl $crate::codec::Decodable for $request {
            fn command_id() -> $crate::datatypes::CommandId {
                $request_id
            }

            fn decode(
                header: $crate::codec::PduHeader,
                buf: &mut std::io::Cursor<&[u8]>,
            ) -> Result<Self, $crate::codec::CodecError> {
                use $crate::codec::{decode_cstring, decode_enum};
                use $crate::datatypes::{
                    MAX_ADDRESS_RANGE_LENGTH, MAX_PASSWORD_LENGTH, MAX_SYSTEM_ID_LENGTH,
                    MAX_SYSTEM_TYPE_LENGTH,
                };

                Self::validate_header(&header)?;

                let system_id = decode_cstring(buf, MAX_SYSTEM_ID_LENGTH + 1, "system_id")?;
                let password = decode_cstring(buf, MAX_PASSWORD_LENGTH + 1, "password")?;
                let system_type = decode_cstring(buf, MAX_SYSTEM_TYPE_LENGTH + 1, "system_type")?;
                let interface_version = decode_enum(buf, "interface_version")?;
                let addr_ton = decode_enum(buf, "addr_ton")?;
                let addr_npi = decode_enum(buf, "addr_npi")?;
                let address_range =
                    decode_cstring(buf, MAX_ADDRESS_RANGE_LENGTH + 1, "address_range")?;

                Ok(Self {
                    command_status: header.command_status,
                    sequence_number: header.sequence_number,
                    system_id,
                    password: (!password.is_empty()).then_some(password),
                    system_type,
                    interface_version,
                    addr_ton,
                    addr_npi,
                    address_range,
                })
            }
        }

        impl $crate::codec::Encodable for $request {
            fn encode(&self, buf: &mut bytes::BytesMut) -> Result<(), $crate::codec::CodecError> {
                use bytes::BufMut;
                use $crate::codec::encode_cstring;
                use $crate::datatypes::{
                    MAX_ADDRESS_RANGE_LENGTH, MAX_PASSWORD_LENGTH, MAX_SYSTEM_ID_LENGTH,
                    MAX_SYSTEM_TYPE_LENGTH,
                };

                self.validate()?;

                let start = buf.len();
                $crate::codec::PduHeader {
                    command_length: 0,
                    command_id: $request_id,
                    command_status: self.command_status,
                    sequence_number: self.sequence_number,
                }
                .encode(buf)?;

                encode_cstring(buf, &self.system_id, MAX_SYSTEM_ID_LENGTH + 1);
                encode_cstring(
                    buf,
                    self.password.as_deref().unwrap_or(""),
                    MAX_PASSWORD_LENGTH + 1,
                );
                encode_cstring(buf, &self.system_type, MAX_SYSTEM_TYPE_LENGTH + 1);
                buf.put_u8(self.interface_version as u8);
                buf.put_u8(self.addr_ton.into());
                buf.put_u8(self.addr_npi.into());
                encode_cstring(buf, &self.address_range, MAX_ADDRESS_RANGE_LENGTH + 1);

                $crate::codec::finish_pdu(buf, start)
            }
        }

        impl $crate::codec::Decodable for $response {
            fn command_id() -> $crate::datatypes::CommandId {
                $response_id
            }

            fn decode(
                header: $crate::codec::PduHeader,
                buf: &mut std::io::Cursor<&[u8]>,
            ) -> Result<Self, $crate::codec::CodecError> {
                use bytes::Buf;
                use $crate::datatypes::{MAX_SYSTEM_ID_LENGTH, Tlv, tags};

                Self::validate_header(&header)?;

                // A rejected bind is commonly answered with a bare header
                let system_id = if buf.has_remaining() {
                    $crate::codec::decode_cstring(buf, MAX_SYSTEM_ID_LENGTH + 1, "system_id")?
                } else {
                    String::new()
                };
                let sc_interface_version = Tlv::decode_all(buf)?
                    .into_iter()
                    .find(|tlv| tlv.tag == tags::SC_INTERFACE_VERSION);

                Ok(Self {
                    command_status: header.command_status,
                    sequence_number: header.sequence_number,
                    system_id,
                    sc_interface_version,
                })
            }
        }

        impl $crate::codec::Encodable for $response {
            fn encode(&self, buf: &mut bytes::BytesMut) -> Result<(), $crate::codec::CodecError> {
                use $crate::datatypes::MAX_SYSTEM_ID_LENGTH;

                let start = buf.len();
                $crate::codec::PduHeader {
                    command_length: 0,
                    command_id: $response_id,
                    command_status: self.command_status,
                    sequence_number: self.sequence_number,
                }
                .encode(buf)?;

                $crate::codec::encode_cstring(buf, &self.system_id, MAX_SYSTEM_ID_LENGTH + 1);
                if let Some(ref tlv) = self.sc_interface_version {
                    tlv.encode(buf)?;
                }

                $crate::codec::finish_pdu(buf, start)
            }
        }
    };
}

/// Macro implementing the codec for a short message PDU (submit_sm,
/// deliver_sm).
///
/// Both PDUs carry the identical mandatory body of SMPP v3.4 sections 4.4.1 and
/// 4.6.1 followed by optional TLVs. The struct must expose the fields named
/// below; `sm_length` is derived from `short_message` on encode.
macro_rules! impl_short_message_pdu {
    ($pdu_type:ident, $command_id:expr) => {
        impl $crate::codec::Decodable for $pdu_type {
            fn command_id() -> $crate::datatypes::CommandId {
                $command_id
            }

            fn decode(
                header: $crate::codec::PduHeader,
                buf: &mut std::io::Cursor<&[u8]>,
            ) -> Result<Self, $crate::codec::CodecError> {
                use $crate::codec::{decode_cstring, decode_enum, decode_octets, decode_u8};
                use $crate::datatypes::{
                    MAX_ADDRESS_LENGTH, MAX_DATE_LENGTH, MAX_SERVICE_TYPE_LENGTH, Tlv,
                };

                Self::validate_header(&header)?;

                let service_type =
                    decode_cstring(buf, MAX_SERVICE_TYPE_LENGTH + 1, "service_type")?;
                let source_addr_ton = decode_enum(buf, "source_addr_ton")?;
                let source_addr_npi = decode_enum(buf, "source_addr_npi")?;
                let source_addr = decode_cstring(buf, MAX_ADDRESS_LENGTH + 1, "source_addr")?;
                let dest_addr_ton = decode_enum(buf, "dest_addr_ton")?;
                let dest_addr_npi = decode_enum(buf, "dest_addr_npi")?;
                let destination_addr =
                    decode_cstring(buf, MAX_ADDRESS_LENGTH + 1, "destination_addr")?;
                let esm_class = decode_u8(buf)?.into();
                let protocol_id = decode_u8(buf)?;
                let priority_flag = decode_u8(buf)?;
                let schedule_delivery_time =
                    decode_cstring(buf, MAX_DATE_LENGTH + 1, "schedule_delivery_time")?;
                let validity_period = decode_cstring(buf, MAX_DATE_LENGTH + 1, "validity_period")?;
                let registered_delivery = decode_u8(buf)?;
                let replace_if_present_flag = decode_u8(buf)?;
                let data_coding = decode_u8(buf)?.into();
                let sm_default_msg_id = decode_u8(buf)?;
                let sm_length = decode_u8(buf)?;
                let short_message = decode_octets(buf, sm_length as usize, "short_message")?;
                let optional_parameters = Tlv::decode_all(buf)?;

                Ok(Self {
                    command_status: header.command_status,
                    sequence_number: header.sequence_number,
                    service_type,
                    source_addr_ton,
                    source_addr_npi,
                    source_addr,
                    dest_addr_ton,
                    dest_addr_npi,
                    destination_addr,
                    esm_class,
                    protocol_id,
                    priority_flag,
                    schedule_delivery_time,
                    validity_period,
                    registered_delivery,
                    replace_if_present_flag,
                    data_coding,
                    sm_default_msg_id,
                    short_message,
                    optional_parameters,
                })
            }
        }

        impl $crate::codec::Encodable for $pdu_type {
            fn encode(&self, buf: &mut bytes::BytesMut) -> Result<(), $crate::codec::CodecError> {
                use bytes::BufMut;
                use $crate::codec::{CodecError, encode_cstring};
                use $crate::datatypes::{
                    MAX_ADDRESS_LENGTH, MAX_DATE_LENGTH, MAX_SERVICE_TYPE_LENGTH,
                    MAX_SHORT_MESSAGE_LENGTH,
                };

                if self.short_message.len() > MAX_SHORT_MESSAGE_LENGTH {
                    return Err(CodecError::FieldValidation {
                        field: "short_message",
                        reason: format!(
                            "{} octets exceeds the {MAX_SHORT_MESSAGE_LENGTH} octet limit",
                            self.short_message.len()
                        ),
                    });
                }

                let start = buf.len();
                $crate::codec::PduHeader {
                    command_length: 0,
                    command_id: $command_id,
                    command_status: self.command_status,
                    sequence_number: self.sequence_number,
                }
                .encode(buf)?;

                encode_cstring(buf, &self.service_type, MAX_SERVICE_TYPE_LENGTH + 1);
                buf.put_u8(self.source_addr_ton.into());
                buf.put_u8(self.source_addr_npi.into());
                encode_cstring(buf, &self.source_addr, MAX_ADDRESS_LENGTH + 1);
                buf.put_u8(self.dest_addr_ton.into());
                buf.put_u8(self.dest_addr_npi.into());
                encode_cstring(buf, &self.destination_addr, MAX_ADDRESS_LENGTH + 1);
                buf.put_u8(self.esm_class.to_byte());
                buf.put_u8(self.protocol_id);
                buf.put_u8(self.priority_flag);
                encode_cstring(buf, &self.schedule_delivery_time, MAX_DATE_LENGTH + 1);
                encode_cstring(buf, &self.validity_period, MAX_DATE_LENGTH + 1);
                buf.put_u8(self.registered_delivery);
                buf.put_u8(self.replace_if_present_flag);
                buf.put_u8(self.data_coding.to_byte());
                buf.put_u8(self.sm_default_msg_id);
                buf.put_u8(self.short_message.len() as u8);
                buf.put_slice(&self.short_message);
                for tlv in &self.optional_parameters {
                    tlv.encode(buf)?;
                }

                $crate::codec::finish_pdu(buf, start)
            }
        }
    };
}

// Make macros available to the rest of the crate
pub(crate) use {
    builder_setters, impl_bind_pdu, impl_complete_header_only_pdu,
    impl_header_only_constructors, impl_header_only_pdu, impl_short_message_pdu,
};
