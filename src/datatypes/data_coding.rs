// ABOUTME: SMPP data_coding scheme values used when submitting and receiving short messages
// ABOUTME: Maps the character sets the gateway produces onto their wire octet

use std::fmt;

/// Data coding scheme of a short message's user data.
///
/// Only the schemes the gateway produces get named variants; every other
/// octet is carried verbatim so inbound deliver_sm PDUs never fail to decode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataCoding {
    /// SMSC Default Alphabet (GSM 03.38 7-bit, one septet per octet)
    #[default]
    SmscDefault,
    /// Latin-1 (ISO-8859-1)
    Latin1,
    /// UCS-2 (ISO/IEC-10646), big-endian
    Ucs2,
    /// Any other value
    Custom(u8),
}

impl DataCoding {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x00 => DataCoding::SmscDefault,
            0x03 => DataCoding::Latin1,
            0x08 => DataCoding::Ucs2,
            other => DataCoding::Custom(other),
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            DataCoding::SmscDefault => 0x00,
            DataCoding::Latin1 => 0x03,
            DataCoding::Ucs2 => 0x08,
            DataCoding::Custom(value) => *value,
        }
    }

    /// Size in octets of one encoding unit (septet, octet or UTF-16 code unit).
    pub fn unit_size(&self) -> usize {
        match self {
            DataCoding::Ucs2 => 2,
            _ => 1,
        }
    }

    pub fn charset_name(&self) -> &'static str {
        match self {
            DataCoding::SmscDefault => "GSM 7-bit",
            DataCoding::Latin1 => "Latin-1",
            DataCoding::Ucs2 => "UCS-2",
            DataCoding::Custom(_) => "Custom",
        }
    }
}

impl fmt::Display for DataCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.charset_name(), self.to_byte())
    }
}

impl fmt::Debug for DataCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataCoding::Custom(value) => write!(f, "DataCoding::Custom(0x{value:02X})"),
            other => write!(f, "DataCoding::{}", other.charset_name()),
        }
    }
}

impl From<u8> for DataCoding {
    fn from(value: u8) -> Self {
        DataCoding::from_byte(value)
    }
}

impl From<DataCoding> for u8 {
    fn from(data_coding: DataCoding) -> Self {
        data_coding.to_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_coding_wire_values() {
        assert_eq!(DataCoding::SmscDefault.to_byte(), 0x00);
        assert_eq!(DataCoding::Latin1.to_byte(), 0x03);
        assert_eq!(DataCoding::Ucs2.to_byte(), 0x08);
        assert_eq!(DataCoding::from_byte(0xF0), DataCoding::Custom(0xF0));
        assert_eq!(u8::from(DataCoding::from(0x08)), 0x08);
    }

    #[test]
    fn data_coding_display() {
        assert_eq!(DataCoding::Ucs2.to_string(), "UCS-2 (0x08)");
        assert_eq!(DataCoding::Ucs2.unit_size(), 2);
        assert_eq!(DataCoding::SmscDefault.unit_size(), 1);
    }
}
