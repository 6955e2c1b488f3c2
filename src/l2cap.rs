//! L2CAP framing for the Attribute Protocol's fixed channel
//!
//! ATT rides the LE-U fixed channel, identifier `0x0004`. This module keeps only what that
//! restriction needs: dynamic channel allocation, BR/EDR channel ids, and an HCI-backed channel
//! impl are all out of scope (GATT and classic Bluetooth are not part of this engine).

use std::fmt;

/// A channel identifier on the LE-U logical link
///
/// Narrowed to the one fixed channel this crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelIdentifier {
    AttributeProtocol,
}

impl ChannelIdentifier {
    pub const ATTRIBUTE_PROTOCOL_CID: u16 = 0x0004;

    pub fn to_val(self) -> u16 {
        match self {
            ChannelIdentifier::AttributeProtocol => Self::ATTRIBUTE_PROTOCOL_CID,
        }
    }

    pub fn from_raw(val: u16) -> Result<Self, u16> {
        match val {
            Self::ATTRIBUTE_PROTOCOL_CID => Ok(ChannelIdentifier::AttributeProtocol),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDataError {
    RawDataTooSmall,
    PayloadLengthIncorrect,
    InvalidChannelId(u16),
}

impl fmt::Display for AclDataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AclDataError::RawDataTooSmall => write!(f, "raw data is too small for an L2CAP frame"),
            AclDataError::PayloadLengthIncorrect => {
                write!(f, "declared payload length didn't match the actual payload length")
            }
            AclDataError::InvalidChannelId(cid) => write!(f, "invalid channel id {:#06x}", cid),
        }
    }
}

impl std::error::Error for AclDataError {}

/// One L2CAP frame: a channel id and its payload
///
/// One `AclData` is exactly one ATT PDU on this channel - there is no reassembly, since this
/// engine never negotiates an L2CAP MTU smaller than a single PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclData {
    channel_id: ChannelIdentifier,
    payload: Vec<u8>,
}

impl AclData {
    pub fn new(payload: Vec<u8>, channel_id: ChannelIdentifier) -> Self {
        AclData { channel_id, payload }
    }

    pub fn channel_id(&self) -> ChannelIdentifier {
        self.channel_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// `[len_le_u16][channel_id_le_u16][payload]`
    pub fn into_raw_data(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(4 + self.payload.len());

        let len = self.payload.len() as u16;
        v.extend_from_slice(&len.to_le_bytes());
        v.extend_from_slice(&self.channel_id.to_val().to_le_bytes());
        v.extend_from_slice(&self.payload);

        v
    }

    pub fn from_raw_data(data: &[u8]) -> Result<Self, AclDataError> {
        if data.len() < 4 {
            return Err(AclDataError::RawDataTooSmall);
        }

        let len = u16::from_le_bytes([data[0], data[1]]) as usize;
        let raw_cid = u16::from_le_bytes([data[2], data[3]]);
        let payload = &data[4..];

        if payload.len() != len {
            return Err(AclDataError::PayloadLengthIncorrect);
        }

        let channel_id =
            ChannelIdentifier::from_raw(raw_cid).map_err(AclDataError::InvalidChannelId)?;

        Ok(AclData { channel_id, payload: payload.to_vec() })
    }
}
