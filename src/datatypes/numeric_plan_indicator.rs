use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Numbering Plan Indicator (NPI) of an SME address.
#[derive(TryFromPrimitive, IntoPrimitive, Serialize, Deserialize)]
#[repr(u8)]
#[serde(try_from = "u8", into = "u8")]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NumericPlanIndicator {
    Unknown = 0b0000_0000,
    Isdn = 0b0000_0001,
    Data = 0b0000_0011,
    Telex = 0b0000_0100,
    LandMobile = 0b0000_0110,
    National = 0b0000_1000,
    Private = 0b0000_1001,
    Ermes = 0b0000_1010,
    Internet = 0b0000_1110,
    WapClientId = 0b0001_0010,
}

impl Default for NumericPlanIndicator {
    fn default() -> Self {
        NumericPlanIndicator::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::TypeOfNumber;

    #[test]
    fn addressing_values_match_wire_encoding() {
        assert_eq!(u8::from(TypeOfNumber::National), 2);
        assert_eq!(u8::from(TypeOfNumber::Abbreviated), 6);
        assert_eq!(u8::from(NumericPlanIndicator::Isdn), 1);
        assert_eq!(NumericPlanIndicator::try_from(18).unwrap(), NumericPlanIndicator::WapClientId);
        assert!(TypeOfNumber::try_from(7).is_err());
    }

    #[test]
    fn addressing_deserializes_from_numbers() {
        let ton: TypeOfNumber = serde_json::from_str("5").unwrap();
        assert_eq!(ton, TypeOfNumber::Alphanumeric);
        let npi: Result<NumericPlanIndicator, _> = serde_json::from_str("2");
        assert!(npi.is_err());
    }
}
