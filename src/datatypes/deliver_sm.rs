use crate::codec::{CodecError, Decodable, Encodable, PduHeader, decode_cstring, encode_cstring};
use crate::datatypes::{
    CommandId, CommandStatus, DataCoding, EsmClass, MAX_MESSAGE_ID_LENGTH, NumericPlanIndicator,
    Tlv, TypeOfNumber, tags,
};
use crate::macros::impl_short_message_pdu;
use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;

/// deliver_sm is issued by the SMSC to route a mobile originated message or a
/// delivery receipt to the ESME. Its body layout is identical to submit_sm.
///
/// The gateway forwards the decoded PDU unchanged to event subscribers and
/// answers with an empty deliver_sm_resp.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSm {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    pub service_type: String,
    pub source_addr_ton: TypeOfNumber,
    pub source_addr_npi: NumericPlanIndicator,
    pub source_addr: String,
    pub dest_addr_ton: TypeOfNumber,
    pub dest_addr_npi: NumericPlanIndicator,
    pub destination_addr: String,
    pub esm_class: EsmClass,
    pub protocol_id: u8,
    pub priority_flag: u8,
    pub schedule_delivery_time: String,
    pub validity_period: String,
    pub registered_delivery: u8,
    pub replace_if_present_flag: u8,
    pub data_coding: DataCoding,
    pub sm_default_msg_id: u8,
    pub short_message: Bytes,
    pub optional_parameters: Vec<Tlv>,
}

impl_short_message_pdu!(DeliverSm, CommandId::DeliverSm);

impl DeliverSm {
    /// True when the SMSC flagged this PDU as a delivery receipt.
    pub fn is_delivery_receipt(&self) -> bool {
        self.esm_class.is_delivery_receipt()
    }

    /// The receipted_message_id TLV, i.e. the SMSC message id of the
    /// submit_sm this receipt refers to.
    pub fn receipted_message_id(&self) -> Option<String> {
        self.optional_parameters
            .iter()
            .find(|tlv| tlv.tag == tags::RECEIPTED_MESSAGE_ID)
            .map(|tlv| {
                let value = tlv.value.as_ref();
                let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
                String::from_utf8_lossy(&value[..end]).into_owned()
            })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeliverSmResponse {
    pub command_status: CommandStatus,
    pub sequence_number: u32,
    /// Unused by SMPP v3.4; always NULL.
    pub message_id: String,
}

impl DeliverSmResponse {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            command_status: CommandStatus::Ok,
            sequence_number,
            message_id: String::new(),
        }
    }
}

impl Decodable for DeliverSmResponse {
    fn command_id() -> CommandId {
        CommandId::DeliverSmResp
    }

    fn decode(header: PduHeader, buf: &mut Cursor<&[u8]>) -> Result<Self, CodecError> {
        Self::validate_header(&header)?;

        let message_id = if buf.has_remaining() {
            decode_cstring(buf, MAX_MESSAGE_ID_LENGTH + 1, "message_id")?
        } else {
            String::new()
        };

        Ok(Self {
            command_status: header.command_status,
            sequence_number: header.sequence_number,
            message_id,
        })
    }
}

impl Encodable for DeliverSmResponse {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let start = buf.len();
        PduHeader {
            command_length: 0,
            command_id: CommandId::DeliverSmResp,
            command_status: self.command_status,
            sequence_number: self.sequence_number,
        }
        .encode(buf)?;

        encode_cstring(buf, &self.message_id, MAX_MESSAGE_ID_LENGTH + 1);

        crate::codec::finish_pdu(buf, start)
    }
}
