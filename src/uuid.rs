//! Bluetooth UUIDs
//!
//! A Bluetooth UUID is a 128 bit value, but the Bluetooth SIG assigns 16 and 32 bit "short" forms
//! that are derived from the 128 bit Bluetooth Base UUID. This module implements the tagged union
//! of the three widths, along with the canonical textual form and wire (de)serialization used by
//! the Attribute Protocol.
//!
//! See the Bluetooth Specification (v5.0), Vol. 3, Part B, Section 2.5.1.

use core::convert::TryFrom;
use core::fmt;

/// The Bluetooth Base UUID: `00000000-0000-1000-8000-00805F9B34FB`
///
/// A 16 or 32 bit UUID is the Base UUID with its first 32 bits replaced by the short value.
pub const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_00805F9B34FB;

/// A Bluetooth UUID of one of the three assigned widths
///
/// Equality and hashing are width-normalized: a 16 bit UUID and its 128 bit expansion via the
/// [Bluetooth Base UUID](BASE_UUID) compare equal.
#[derive(Clone, Copy, Debug)]
pub enum Uuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(u128),
}

impl Uuid {
    /// Construct a UUID from its 16 bit short form
    pub fn from_u16(val: u16) -> Self {
        Uuid::Uuid16(val)
    }

    /// Construct a UUID from its 32 bit short form
    pub fn from_u32(val: u32) -> Self {
        Uuid::Uuid32(val)
    }

    /// Construct a UUID from a full 128 bit value
    pub fn from_u128(val: u128) -> Self {
        Uuid::Uuid128(val)
    }

    /// Expand this UUID to its full 128 bit value
    ///
    /// 16 and 32 bit UUIDs are expanded against the [Bluetooth Base UUID](BASE_UUID).
    pub fn as_u128(&self) -> u128 {
        match self {
            Uuid::Uuid16(v) => ((*v as u128) << 96) | BASE_UUID,
            Uuid::Uuid32(v) => ((*v as u128) << 96) | BASE_UUID,
            Uuid::Uuid128(v) => *v,
        }
    }

    /// Number of bytes this UUID occupies on the wire in its *current* width
    pub fn byte_len(&self) -> usize {
        match self {
            Uuid::Uuid16(_) => 2,
            Uuid::Uuid32(_) => 4,
            Uuid::Uuid128(_) => 16,
        }
    }

    /// Try to narrow this UUID to its 16 bit short form
    ///
    /// Returns `None` if the UUID's 128 bit expansion does not fall within the Base UUID's 16 bit
    /// short-form space.
    pub fn try_as_u16(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(v) => Some(*v),
            _ => {
                let full = self.as_u128();

                if full & !0xFFFF_0000_0000_0000_0000_0000_0000_0000 == BASE_UUID & !0xFFFF_0000_0000_0000_0000_0000_0000_0000 {
                    Some((full >> 96) as u16)
                } else {
                    None
                }
            }
        }
    }

    /// Write this UUID to the wire in little-endian form, at its current width
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Uuid::Uuid16(v) => v.to_le_bytes().to_vec(),
            Uuid::Uuid32(v) => v.to_le_bytes().to_vec(),
            Uuid::Uuid128(v) => v.to_le_bytes().to_vec(),
        }
    }

    /// Parse a UUID from `raw`, inferring the width from its length (2, 4, or 16 bytes)
    pub fn from_bytes(raw: &[u8]) -> Result<Self, UuidError> {
        match raw.len() {
            2 => {
                let mut b = [0u8; 2];
                b.copy_from_slice(raw);
                Ok(Uuid::Uuid16(u16::from_le_bytes(b)))
            }
            4 => {
                let mut b = [0u8; 4];
                b.copy_from_slice(raw);
                Ok(Uuid::Uuid32(u32::from_le_bytes(b)))
            }
            16 => {
                let mut b = [0u8; 16];
                b.copy_from_slice(raw);
                Ok(Uuid::Uuid128(u128::from_le_bytes(b)))
            }
            _ => Err(UuidError::BadLength(raw.len())),
        }
    }

    /// Render the canonical `8-4-4-4-12` lowercase hex textual form
    pub fn to_canonical_string(&self) -> String {
        let v = self.as_u128();

        format!(
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF,
        )
    }
}

impl PartialEq for Uuid {
    fn eq(&self, other: &Uuid) -> bool {
        self.as_u128() == other.as_u128()
    }
}

impl Eq for Uuid {}

impl core::hash::Hash for Uuid {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.as_u128().hash(state)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl From<u16> for Uuid {
    fn from(v: u16) -> Self {
        Uuid::Uuid16(v)
    }
}

impl From<u32> for Uuid {
    fn from(v: u32) -> Self {
        Uuid::Uuid32(v)
    }
}

impl From<u128> for Uuid {
    fn from(v: u128) -> Self {
        Uuid::Uuid128(v)
    }
}

impl TryFrom<Uuid> for u16 {
    type Error = Uuid;

    fn try_from(uuid: Uuid) -> Result<u16, Uuid> {
        uuid.try_as_u16().ok_or(uuid)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UuidError {
    /// A UUID on the wire must be 2, 4, or 16 bytes
    BadLength(usize),
    /// The textual form couldn't be parsed as hex
    BadHex,
    /// The textual form wasn't 4 hex digits (16 bit shorthand) or 36 characters (8-4-4-4-12)
    BadFormat,
}

impl fmt::Display for UuidError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UuidError::BadLength(len) => write!(f, "invalid UUID byte length: {}", len),
            UuidError::BadHex => write!(f, "UUID text contains non-hex characters"),
            UuidError::BadFormat => write!(f, "UUID text is neither 4-hex-digit shorthand nor 8-4-4-4-12"),
        }
    }
}

impl core::str::FromStr for Uuid {
    type Err = UuidError;

    /// Accepts the canonical `8-4-4-4-12` textual form, or a bare 4 hex digit shorthand for a
    /// 16 bit UUID.
    fn from_str(s: &str) -> Result<Self, UuidError> {
        fn hex_u64(s: &str) -> Result<u64, UuidError> {
            u64::from_str_radix(s, 16).map_err(|_| UuidError::BadHex)
        }

        if s.len() == 4 {
            let v = u16::from_str_radix(s, 16).map_err(|_| UuidError::BadHex)?;
            return Ok(Uuid::Uuid16(v));
        }

        let parts: Vec<&str> = s.split('-').collect();

        if parts.len() != 5
            || parts[0].len() != 8
            || parts[1].len() != 4
            || parts[2].len() != 4
            || parts[3].len() != 4
            || parts[4].len() != 12
        {
            return Err(UuidError::BadFormat);
        }

        let hi = hex_u64(parts[0])? as u128;
        let a = hex_u64(parts[1])? as u128;
        let b = hex_u64(parts[2])? as u128;
        let c = hex_u64(parts[3])? as u128;
        let lo = hex_u64(parts[4])? as u128;

        let val = (hi << 96) | (a << 80) | (b << 64) | (c << 48) | lo;

        Ok(Uuid::Uuid128(val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn base_uuid_expansion_round_trips() {
        let short = Uuid::from_u16(0x2800);
        let text = short.to_canonical_string();
        assert_eq!(text, "00002800-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn equality_is_width_normalized() {
        let short = Uuid::from_u16(0x180D);
        let long = Uuid::from_u128(short.as_u128());
        assert_eq!(short, long);
    }

    #[test]
    fn shorthand_parses_as_16_bit() {
        let uuid = Uuid::from_str("2a37").unwrap();
        assert_eq!(uuid, Uuid::from_u16(0x2A37));
    }

    #[test]
    fn canonical_form_parses() {
        let uuid = Uuid::from_str("0000180d-0000-1000-8000-00805f9b34fb").unwrap();
        assert_eq!(uuid, Uuid::from_u16(0x180D));
    }

    #[test]
    fn wire_round_trip_all_widths() {
        for uuid in &[Uuid::from_u16(0x1801), Uuid::from_u32(0xDEAD_BEEF), Uuid::from_u128(0x1234_5678_9abc_def0_1122_3344_5566_7788)] {
            let bytes = uuid.to_bytes();
            let parsed = Uuid::from_bytes(&bytes).unwrap();
            assert_eq!(*uuid, parsed);
        }
    }

    #[test]
    fn bad_byte_length_is_rejected() {
        assert_eq!(Uuid::from_bytes(&[1, 2, 3]), Err(UuidError::BadLength(3)));
    }
}
