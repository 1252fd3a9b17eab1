// ABOUTME: Splits message text into submit_sm-sized parts with a concatenation UDH when needed
// ABOUTME: Picks GSM 03.38, Latin-1 or UCS-2 and never breaks an escape or surrogate pair

use crate::client::profile::TextEncoding;
use crate::datatypes::{DataCoding, EsmClass};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// GSM 03.38 default alphabet indexed by septet value. 0x1B is the escape to
/// the extension table and never maps a character.
const GSM_BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1b}', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

const GSM_ESCAPE: u8 = 0x1B;

/// Extension table characters, each sent as escape + code.
fn gsm_extension(c: char) -> Option<u8> {
    match c {
        '\u{0c}' => Some(0x0A),
        '^' => Some(0x14),
        '{' => Some(0x28),
        '}' => Some(0x29),
        '\\' => Some(0x2F),
        '[' => Some(0x3C),
        '~' => Some(0x3D),
        ']' => Some(0x3E),
        '|' => Some(0x40),
        '€' => Some(0x65),
        _ => None,
    }
}

fn gsm_basic(c: char) -> Option<u8> {
    if c == '\u{1b}' {
        return None;
    }
    GSM_BASIC.iter().position(|&g| g == c).map(|septet| septet as u8)
}

/// Part budgets in encoding units: (single message, per concatenated part).
const GSM_BUDGET: (usize, usize) = (160, 153);
const LATIN1_BUDGET: (usize, usize) = (140, 134);
const UCS2_BUDGET: (usize, usize) = (70, 67);

const MAX_PARTS: usize = 255;

/// The 6-octet concatenation UDH: `05 00 03 ref total seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatHeader {
    pub reference: u8,
    pub total: u8,
    /// 1-based
    pub sequence: u8,
}

impl ConcatHeader {
    pub const LEN: usize = 6;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [0x05, 0x00, 0x03, self.reference, self.total, self.sequence]
    }
}

/// One transmittable fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// User data already encoded for the split's data coding, without UDH
    pub payload: Bytes,
    pub header: Option<ConcatHeader>,
}

impl Part {
    /// The submit_sm short_message: UDH (if any) followed by the payload.
    pub fn short_message(&self) -> Bytes {
        match self.header {
            None => self.payload.clone(),
            Some(header) => {
                let mut buf = BytesMut::with_capacity(ConcatHeader::LEN + self.payload.len());
                buf.put_slice(&header.to_bytes());
                buf.put_slice(&self.payload);
                buf.freeze()
            }
        }
    }
}

/// Result of splitting one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitMessage {
    pub parts: Vec<Part>,
    pub data_coding: DataCoding,
    pub esm_class: EsmClass,
    /// Parts cut off because the text needed more than 255
    pub dropped_parts: usize,
}

/// Split with the GSM 03.38 alphabet as the compact repertoire.
pub fn split(text: &str) -> SplitMessage {
    split_with(text, TextEncoding::Gsm)
}

/// Split `text`, using `encoding` when every character fits it and UCS-2
/// otherwise.
pub fn split_with(text: &str, encoding: TextEncoding) -> SplitMessage {
    split_with_reference(text, encoding, rand::random_range(1..=255u8))
}

fn split_with_reference(text: &str, encoding: TextEncoding, reference: u8) -> SplitMessage {
    let (data_coding, units) = encode_units(text, encoding);
    let budget = match data_coding {
        DataCoding::SmscDefault => GSM_BUDGET,
        DataCoding::Latin1 => LATIN1_BUDGET,
        _ => UCS2_BUDGET,
    };

    let total_units: usize = units.iter().map(|unit| unit.len() / data_coding.unit_size()).sum();
    if total_units <= budget.0 {
        return SplitMessage {
            parts: vec![Part {
                payload: Bytes::from(units.concat()),
                header: None,
            }],
            data_coding,
            esm_class: EsmClass::new(),
            dropped_parts: 0,
        };
    }

    // Greedy fill; a character's units always travel together.
    let mut payloads: Vec<Vec<u8>> = Vec::new();
    let mut current = Vec::new();
    let mut used = 0;
    for unit in &units {
        let cost = unit.len() / data_coding.unit_size();
        if used + cost > budget.1 {
            payloads.push(std::mem::take(&mut current));
            used = 0;
        }
        current.extend_from_slice(unit);
        used += cost;
    }
    payloads.push(current);

    let dropped_parts = payloads.len().saturating_sub(MAX_PARTS);
    if dropped_parts > 0 {
        warn!(
            "Message needs {} parts, truncating to {}",
            payloads.len(),
            MAX_PARTS
        );
        payloads.truncate(MAX_PARTS);
    }

    let total = payloads.len() as u8;
    let parts = payloads
        .into_iter()
        .enumerate()
        .map(|(index, payload)| Part {
            payload: Bytes::from(payload),
            header: Some(ConcatHeader {
                reference,
                total,
                sequence: index as u8 + 1,
            }),
        })
        .collect();

    SplitMessage {
        parts,
        data_coding,
        esm_class: EsmClass::new().with_udhi(),
        dropped_parts,
    }
}

/// Encode each character separately so splitting never separates the
/// octets of one character.
fn encode_units(text: &str, encoding: TextEncoding) -> (DataCoding, Vec<Vec<u8>>) {
    match encoding {
        TextEncoding::Gsm => {
            let septets: Option<Vec<Vec<u8>>> = text
                .chars()
                .map(|c| match gsm_basic(c) {
                    Some(septet) => Some(vec![septet]),
                    None => gsm_extension(c).map(|code| vec![GSM_ESCAPE, code]),
                })
                .collect();
            if let Some(septets) = septets {
                return (DataCoding::SmscDefault, septets);
            }
        }
        TextEncoding::Latin1 => {
            let octets: Option<Vec<Vec<u8>>> = text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).ok().map(|octet| vec![octet]))
                .collect();
            if let Some(octets) = octets {
                return (DataCoding::Latin1, octets);
            }
        }
    }

    let ucs2 = text
        .chars()
        .map(|c| {
            let mut units = [0u16; 2];
            c.encode_utf16(&mut units)
                .iter()
                .flat_map(|unit| unit.to_be_bytes())
                .collect::<Vec<u8>>()
        })
        .collect();
    (DataCoding::Ucs2, ucs2)
}
