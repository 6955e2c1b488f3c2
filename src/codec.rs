//! Encoding and decoding of ATT protocol data units (PDUs)
//!
//! This module builds the byte buffers the [`link`](crate::link) sends and parses the ones it
//! receives. It does not know about the transaction slot or discovery state; it is pure data
//! transformation, built around raw byte slices rather than a generic serialization trait, since
//! the client-side engine only ever moves opaque attribute values, not typed GATT characteristics.

use crate::uuid::Uuid;
use std::fmt;

/// Opcodes this engine generates
pub mod opcode {
    pub const ERROR_RESPONSE: u8 = 0x01;
    pub const EXCHANGE_MTU_REQUEST: u8 = 0x02;
    pub const EXCHANGE_MTU_RESPONSE: u8 = 0x03;
    pub const FIND_INFORMATION_REQUEST: u8 = 0x04;
    pub const FIND_INFORMATION_RESPONSE: u8 = 0x05;
    pub const FIND_BY_TYPE_VALUE_REQUEST: u8 = 0x06;
    pub const FIND_BY_TYPE_VALUE_RESPONSE: u8 = 0x07;
    pub const READ_BY_TYPE_REQUEST: u8 = 0x08;
    pub const READ_BY_TYPE_RESPONSE: u8 = 0x09;
    pub const READ_REQUEST: u8 = 0x0A;
    pub const READ_RESPONSE: u8 = 0x0B;
    pub const READ_BLOB_REQUEST: u8 = 0x0C;
    pub const READ_BLOB_RESPONSE: u8 = 0x0D;
    pub const READ_MULTIPLE_REQUEST: u8 = 0x0E;
    pub const READ_MULTIPLE_RESPONSE: u8 = 0x0F;
    pub const READ_BY_GROUP_TYPE_REQUEST: u8 = 0x10;
    pub const READ_BY_GROUP_TYPE_RESPONSE: u8 = 0x11;
    pub const WRITE_REQUEST: u8 = 0x12;
    pub const WRITE_RESPONSE: u8 = 0x13;
    pub const PREPARE_WRITE_REQUEST: u8 = 0x16;
    pub const PREPARE_WRITE_RESPONSE: u8 = 0x17;
    pub const EXECUTE_WRITE_REQUEST: u8 = 0x18;
    pub const EXECUTE_WRITE_RESPONSE: u8 = 0x19;
    pub const HANDLE_VALUE_NOTIFICATION: u8 = 0x1B;
    pub const HANDLE_VALUE_INDICATION: u8 = 0x1D;
    pub const HANDLE_VALUE_CONFIRMATION: u8 = 0x1E;
    pub const WRITE_COMMAND: u8 = 0x52;
    pub const SIGNED_WRITE_COMMAND: u8 = 0xD2;
}

/// Name table for [`opcode_name`], ordered by opcode value for readability, not lookup speed -
/// the table is tiny enough that a linear scan never matters.
const OPCODE_NAMES: &[(u8, &str)] = &[
    (opcode::ERROR_RESPONSE, "error response"),
    (opcode::EXCHANGE_MTU_REQUEST, "exchange mtu request"),
    (opcode::EXCHANGE_MTU_RESPONSE, "exchange mtu response"),
    (opcode::FIND_INFORMATION_REQUEST, "find information request"),
    (opcode::FIND_INFORMATION_RESPONSE, "find information response"),
    (opcode::FIND_BY_TYPE_VALUE_REQUEST, "find by type value request"),
    (opcode::FIND_BY_TYPE_VALUE_RESPONSE, "find by type value response"),
    (opcode::READ_BY_TYPE_REQUEST, "read by type request"),
    (opcode::READ_BY_TYPE_RESPONSE, "read by type response"),
    (opcode::READ_REQUEST, "read request"),
    (opcode::READ_RESPONSE, "read response"),
    (opcode::READ_BLOB_REQUEST, "read blob request"),
    (opcode::READ_BLOB_RESPONSE, "read blob response"),
    (opcode::READ_MULTIPLE_REQUEST, "read multiple request"),
    (opcode::READ_MULTIPLE_RESPONSE, "read multiple response"),
    (opcode::READ_BY_GROUP_TYPE_REQUEST, "read by group type request"),
    (opcode::READ_BY_GROUP_TYPE_RESPONSE, "read by group type response"),
    (opcode::WRITE_REQUEST, "write request"),
    (opcode::WRITE_RESPONSE, "write response"),
    (opcode::PREPARE_WRITE_REQUEST, "prepare write request"),
    (opcode::PREPARE_WRITE_RESPONSE, "prepare write response"),
    (opcode::EXECUTE_WRITE_REQUEST, "execute write request"),
    (opcode::EXECUTE_WRITE_RESPONSE, "execute write response"),
    (opcode::HANDLE_VALUE_NOTIFICATION, "handle value notification"),
    (opcode::HANDLE_VALUE_INDICATION, "handle value indication"),
    (opcode::HANDLE_VALUE_CONFIRMATION, "handle value confirmation"),
    (opcode::WRITE_COMMAND, "write command"),
    (opcode::SIGNED_WRITE_COMMAND, "signed write command"),
];

const ERROR_NAMES: &[(u8, &str)] = &[
    (0x01, "Invalid Handle"),
    (0x02, "Read Not Permitted"),
    (0x03, "Write Not Permitted"),
    (0x04, "Invalid PDU"),
    (0x05, "Authentication required"),
    (0x06, "Request Not Supported"),
    (0x07, "Invalid Offset"),
    (0x08, "Authorization required"),
    (0x09, "Prepare Queue Full"),
    (0x0A, "Attribute Not Found"),
    (0x0B, "Attribute Not Long"),
    (0x0C, "Insufficient Encryption Key Size"),
    (0x0D, "Invalid Attribute Value Length"),
    (0x0E, "Unlikely Error"),
    (0x0F, "Insufficient Encryption"),
    (0x10, "Unsupported Group Type"),
    (0x11, "Insufficient Resources"),
    (0x80, "I/O Error"),
    (0x81, "Timeout"),
    (0x82, "Aborted"),
];

/// Look up the display name of a known opcode
pub fn opcode_name(opcode: u8) -> Option<&'static str> {
    OPCODE_NAMES.iter().find(|(o, _)| *o == opcode).map(|(_, n)| *n)
}

/// Look up the display name of an ATT error code
pub fn error_name(code: u8) -> Option<&'static str> {
    ERROR_NAMES.iter().find(|(c, _)| *c == code).map(|(_, n)| *n)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The PDU was shorter than its format requires
    TooShort,
    /// A Find Information Response format byte was neither 1 nor 2
    BadFindInfoFormat(u8),
    /// A per-record length prefix was smaller than the fixed header it must contain
    BadRecordLength(u8),
    /// The body length wasn't an exact multiple of the record length
    MisalignedRecords,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::TooShort => write!(f, "PDU body too short"),
            CodecError::BadFindInfoFormat(b) => write!(f, "unknown find information format byte {:#04x}", b),
            CodecError::BadRecordLength(l) => write!(f, "record length {} too small for record header", l),
            CodecError::MisalignedRecords => write!(f, "record list length is not a multiple of the record length"),
        }
    }
}

impl std::error::Error for CodecError {}

/// An attribute's handle and type, as returned by Find Information
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeInfo {
    pub handle: u16,
    pub uuid: Uuid,
}

/// A found-handle/group-end-handle pair, as returned by Find By Type Value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlesInfo {
    pub handle: u16,
    pub group_end_handle: u16,
}

/// The maximum attribute value length this engine stores in a single record (§6)
pub const MAX_ATTR_VALUE_LENGTH: usize = 253;

/// A handle and its opaque value, as returned by Read By Type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeData {
    pub handle: u16,
    pub value: Vec<u8>,
}

/// A handle, its group's end handle, and an opaque value, as returned by Read By Group Type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupAttributeData {
    pub handle: u16,
    pub group_end_handle: u16,
    pub value: Vec<u8>,
}

/// Truncate `value` to fit within `budget` remaining bytes of a PDU being built
///
/// This is the truncation policy of §3: values that don't fit are silently cut down rather than
/// rejected, matching the ATT specification's "maximum attribute value length" rule.
fn truncate_to_budget<'a>(value: &'a [u8], budget: usize) -> &'a [u8] {
    &value[..value.len().min(budget)]
}

/// Encode a request whose parameters are `[handle][value?]` - Read Request, Write Command, Write
/// Request.
///
/// `mtu` bounds the total PDU length (opcode + handle + value) to at most `mtu` bytes; `value` is
/// truncated to fit if necessary.
pub fn encode_handle_op(opcode: u8, handle: u16, value: Option<&[u8]>, mtu: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(mtu.min(3 + value.map_or(0, <[u8]>::len)));

    buf.push(opcode);
    buf.extend_from_slice(&handle.to_le_bytes());

    if let Some(value) = value {
        let budget = mtu.saturating_sub(buf.len());
        buf.extend_from_slice(truncate_to_budget(value, budget));
    }

    buf
}

/// Encode a request whose parameters are `[start][end][uuid?][value?]` - Find Information, Find
/// By Type Value, Read By Type, Read By Group Type.
pub fn encode_range_op(
    opcode: u8,
    start: u16,
    end: u16,
    type_uuid: Option<&Uuid>,
    value: Option<&[u8]>,
    mtu: usize,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(mtu);

    buf.push(opcode);
    buf.extend_from_slice(&start.to_le_bytes());
    buf.extend_from_slice(&end.to_le_bytes());

    if let Some(uuid) = type_uuid {
        buf.extend_from_slice(&uuid.to_bytes());
    }

    if let Some(value) = value {
        let budget = mtu.saturating_sub(buf.len());
        buf.extend_from_slice(truncate_to_budget(value, budget));
    }

    buf
}

/// Encode the MTU Exchange Request parameter: `[client_rx_mtu]`
pub fn encode_mtu_exchange_request(client_rx_mtu: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3);
    buf.push(opcode::EXCHANGE_MTU_REQUEST);
    buf.extend_from_slice(&client_rx_mtu.to_le_bytes());
    buf
}

/// Parse the MTU Exchange Response body (the two bytes after the opcode): `[server_rx_mtu]`
pub fn parse_mtu_exchange_response(body: &[u8]) -> Result<u16, CodecError> {
    if body.len() < 2 {
        return Err(CodecError::TooShort);
    }

    Ok(u16::from_le_bytes([body[0], body[1]]))
}

/// Parse a Find Information Response body (the bytes after the opcode)
///
/// The first byte is the format (1 = 16 bit UUIDs, 2 = 128 bit UUIDs); the rest is a packed
/// sequence of `(handle, uuid)` pairs at the implied width.
pub fn parse_find_info_resp(body: &[u8]) -> Result<Vec<AttributeInfo>, CodecError> {
    if body.is_empty() {
        return Err(CodecError::TooShort);
    }

    let uuid_len = match body[0] {
        1 => 2,
        2 => 16,
        other => return Err(CodecError::BadFindInfoFormat(other)),
    };

    let records = &body[1..];
    let record_len = 2 + uuid_len;

    if records.len() % record_len != 0 {
        return Err(CodecError::MisalignedRecords);
    }

    let mut out = Vec::with_capacity(records.len() / record_len);

    for chunk in records.chunks_exact(record_len) {
        let handle = u16::from_le_bytes([chunk[0], chunk[1]]);
        let uuid = Uuid::from_bytes(&chunk[2..]).map_err(|_| CodecError::MisalignedRecords)?;
        out.push(AttributeInfo { handle, uuid });
    }

    Ok(out)
}

/// Parse a Find By Type Value Response body: a packed sequence of `(handle, group_end_handle)`
/// pairs.
pub fn parse_handles_info_list(body: &[u8]) -> Result<Vec<HandlesInfo>, CodecError> {
    if body.len() % 4 != 0 {
        return Err(CodecError::MisalignedRecords);
    }

    Ok(body
        .chunks_exact(4)
        .map(|c| HandlesInfo {
            handle: u16::from_le_bytes([c[0], c[1]]),
            group_end_handle: u16::from_le_bytes([c[2], c[3]]),
        })
        .collect())
}

/// Parse a Read By Type Response body
///
/// The first byte is the per-record length `L` (>= 2); the rest is packed records of length `L`,
/// each `(handle, value_of_len_L-2)`.
pub fn parse_attr_data_list(body: &[u8]) -> Result<Vec<AttributeData>, CodecError> {
    if body.is_empty() {
        return Err(CodecError::TooShort);
    }

    let record_len = body[0] as usize;

    if record_len < 2 {
        return Err(CodecError::BadRecordLength(body[0]));
    }

    let records = &body[1..];

    if records.len() % record_len != 0 {
        return Err(CodecError::MisalignedRecords);
    }

    Ok(records
        .chunks_exact(record_len)
        .map(|c| AttributeData {
            handle: u16::from_le_bytes([c[0], c[1]]),
            value: c[2..].to_vec(),
        })
        .collect())
}

/// Parse a Read By Group Type Response body
///
/// The first byte is the per-record length `L` (>= 4); the rest is packed records of length `L`,
/// each `(handle, group_end_handle, value_of_len_L-4)`.
pub fn parse_group_attr_data_list(body: &[u8]) -> Result<Vec<GroupAttributeData>, CodecError> {
    if body.is_empty() {
        return Err(CodecError::TooShort);
    }

    let record_len = body[0] as usize;

    if record_len < 4 {
        return Err(CodecError::BadRecordLength(body[0]));
    }

    let records = &body[1..];

    if records.len() % record_len != 0 {
        return Err(CodecError::MisalignedRecords);
    }

    Ok(records
        .chunks_exact(record_len)
        .map(|c| GroupAttributeData {
            handle: u16::from_le_bytes([c[0], c[1]]),
            group_end_handle: u16::from_le_bytes([c[2], c[3]]),
            value: c[4..].to_vec(),
        })
        .collect())
}

/// Parse an Error Response body: `[request_opcode][handle_in_error][error_code]`
pub fn parse_error_response(body: &[u8]) -> Result<(u8, u16, u8), CodecError> {
    if body.len() < 4 {
        return Err(CodecError::TooShort);
    }

    Ok((body[0], u16::from_le_bytes([body[1], body[2]]), body[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_handle_op_truncates_to_mtu() {
        let value = [0xAAu8; 40];
        let mtu = 23;

        let buf = encode_handle_op(opcode::WRITE_REQUEST, 0x10, Some(&value), mtu);

        assert_eq!(buf.len(), mtu);
        assert_eq!(buf[0], opcode::WRITE_REQUEST);
        assert_eq!(&buf[1..3], &0x0010u16.to_le_bytes());
    }

    #[test]
    fn encode_handle_op_zero_length_value_is_legal() {
        let buf = encode_handle_op(opcode::READ_REQUEST, 0x0001, None, 23);
        assert_eq!(buf, vec![opcode::READ_REQUEST, 0x01, 0x00]);
    }

    #[test]
    fn find_info_round_trip_16_bit() {
        let body = [0x01u8, 0x01, 0x00, 0x00, 0x28, 0x02, 0x00, 0x01, 0x28];

        let parsed = parse_find_info_resp(&body).unwrap();

        assert_eq!(
            parsed,
            vec![
                AttributeInfo { handle: 1, uuid: Uuid::from_u16(0x2800) },
                AttributeInfo { handle: 2, uuid: Uuid::from_u16(0x2801) },
            ]
        );
    }

    #[test]
    fn handles_info_list_round_trip() {
        let body = [0x01u8, 0x00, 0x05, 0x00, 0x06, 0x00, 0x09, 0x00];
        let parsed = parse_handles_info_list(&body).unwrap();

        assert_eq!(
            parsed,
            vec![
                HandlesInfo { handle: 1, group_end_handle: 5 },
                HandlesInfo { handle: 6, group_end_handle: 9 },
            ]
        );
    }

    #[test]
    fn attr_data_list_round_trip() {
        let body = [0x04u8, 0x01, 0x00, 0xAB, 0xCD, 0x02, 0x00, 0xEF, 0x01];
        let parsed = parse_attr_data_list(&body).unwrap();

        assert_eq!(
            parsed,
            vec![
                AttributeData { handle: 1, value: vec![0xAB, 0xCD] },
                AttributeData { handle: 2, value: vec![0xEF, 0x01] },
            ]
        );
    }

    #[test]
    fn group_attr_data_list_round_trip() {
        let body = [0x06u8, 0x01, 0x00, 0x05, 0x00, 0x18, 0x28];
        let parsed = parse_group_attr_data_list(&body).unwrap();

        assert_eq!(
            parsed,
            vec![GroupAttributeData { handle: 1, group_end_handle: 5, value: vec![0x18, 0x28] }]
        );
    }

    #[test]
    fn error_response_parses() {
        let body = [0x10u8, 0x01, 0x00, 0x0A];
        assert_eq!(parse_error_response(&body).unwrap(), (0x10, 1, 0x0A));
    }

    #[test]
    fn opcode_and_error_names_are_populated() {
        assert_eq!(opcode_name(opcode::READ_REQUEST), Some("read request"));
        assert_eq!(error_name(0x0A), Some("Attribute Not Found"));
        assert_eq!(opcode_name(0xFF), None);
    }
}
