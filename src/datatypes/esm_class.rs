// ABOUTME: SMPP esm_class bitfield carried by submit_sm and deliver_sm
// ABOUTME: Exposes the UDHI flag used for concatenation and the receipt message type

use std::fmt;

/// The esm_class octet.
///
/// Bits 1-0 select the messaging mode, bits 5-2 the message type and bits
/// 7-6 the GSM network features (UDHI, reply path).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EsmClass(u8);

impl EsmClass {
    /// User Data Header Indicator: short_message starts with a UDH.
    pub const UDHI: u8 = 0x40;
    /// Reply path requested.
    pub const REPLY_PATH: u8 = 0x80;
    const MESSAGE_TYPE_MASK: u8 = 0x3C;
    /// Message type bits of an SMSC delivery receipt (deliver_sm only).
    const DELIVERY_RECEIPT: u8 = 0x04;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_byte(value: u8) -> Self {
        Self(value)
    }

    pub fn to_byte(&self) -> u8 {
        self.0
    }

    /// Adds UDHI (User Data Header Indicator) feature
    pub fn with_udhi(self) -> Self {
        Self(self.0 | Self::UDHI)
    }

    /// Returns true if UDHI (User Data Header Indicator) is set
    pub fn has_udhi(&self) -> bool {
        self.0 & Self::UDHI != 0
    }

    /// Returns true if this deliver_sm carries an SMSC delivery receipt
    pub fn is_delivery_receipt(&self) -> bool {
        self.0 & Self::MESSAGE_TYPE_MASK == Self::DELIVERY_RECEIPT
    }
}

impl fmt::Debug for EsmClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EsmClass(0x{:02X})", self.0)
    }
}

impl From<u8> for EsmClass {
    fn from(value: u8) -> Self {
        EsmClass::from_byte(value)
    }
}

impl From<EsmClass> for u8 {
    fn from(esm_class: EsmClass) -> Self {
        esm_class.to_byte()
    }
}
