//! Type definitions for the ATT protocol
use super::constants::*;
use super::error::{AttError, AttErrorCode, AttResult};
use super::opcode::Opcode;
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use std::convert::TryFrom;
use std::fmt;
use std::io::Cursor;

/// Attribute handle on the remote peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u16);

impl Handle {
    /// Create a handle from its 16-bit value
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw handle value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Handle of the Client Characteristic Configuration descriptor
    ///
    /// By convention the CCC descriptor sits one handle above the value it
    /// controls.
    pub fn ccc(&self) -> AttResult<Handle> {
        Handle::try_from(u32::from(self.0) + 1)
    }

    fn to_le_bytes(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl From<u16> for Handle {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl TryFrom<u32> for Handle {
    type Error = AttError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u16::try_from(value)
            .map(Handle)
            .map_err(|_| AttError::InvalidHandle(value))
    }
}

impl From<Handle> for u16 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientConfiguration: u16 {
        const NOTIFY = ATT_CCC_NOTIFY;
        const INDICATE = ATT_CCC_INDICATE;
    }
}

impl ClientConfiguration {
    /// Descriptor value as written on the wire
    pub fn to_value(self) -> Vec<u8> {
        self.bits().to_le_bytes().to_vec()
    }
}

/// ATT packet formats
pub trait AttPacket: Sized {
    /// Opcode for this packet
    fn opcode() -> Opcode;

    /// Minimum encoded length, opcode included
    fn min_len() -> usize {
        1
    }

    /// Parse packet from bytes
    fn parse(data: &[u8]) -> AttResult<Self>;

    /// Serialize packet to bytes
    fn serialize(&self) -> Vec<u8>;
}

/// Validate the opcode byte and length of a frame for packet type `P`
fn check_header<P: AttPacket>(data: &[u8]) -> AttResult<()> {
    let first = *data.first().ok_or(AttError::TruncatedFrame {
        expected: P::min_len(),
        actual: 0,
    })?;

    let actual = Opcode::try_from(first)?;
    if actual != P::opcode() {
        return Err(AttError::UnexpectedOpcode {
            expected: P::opcode(),
            actual,
        });
    }

    if data.len() < P::min_len() {
        return Err(AttError::TruncatedFrame {
            expected: P::min_len(),
            actual: data.len(),
        });
    }

    Ok(())
}

fn read_handle(cursor: &mut Cursor<&[u8]>) -> AttResult<Handle> {
    read_u16(cursor).map(Handle)
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> AttResult<u16> {
    let position = cursor.position() as usize;
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| AttError::TruncatedFrame {
            expected: position + 2,
            actual: cursor.get_ref().len(),
        })
}

/// Error response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Request opcode in error
    pub request_opcode: Opcode,
    /// Attribute handle in error
    pub handle: Handle,
    /// Error code
    pub error_code: AttErrorCode,
}

impl AttPacket for ErrorResponse {
    fn opcode() -> Opcode {
        Opcode::ErrorResponse
    }

    fn min_len() -> usize {
        ATT_ERROR_RSP_LEN
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        let request_opcode = Opcode::try_from(data[1])?;

        let mut cursor = Cursor::new(data);
        cursor.set_position(2);
        let handle = read_handle(&mut cursor)?;

        let error_code = AttErrorCode::try_from(data[4])?;

        Ok(Self {
            request_opcode,
            handle,
            error_code,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ATT_ERROR_RSP_LEN);

        packet.push(Self::opcode().value());
        packet.push(self.request_opcode.value());
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.push(self.error_code.value());

        packet
    }
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(request_opcode: Opcode, handle: Handle, error_code: AttErrorCode) -> Self {
        Self {
            request_opcode,
            handle,
            error_code,
        }
    }
}

/// Read request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Attribute handle to read
    pub handle: Handle,
}

impl AttPacket for ReadRequest {
    fn opcode() -> Opcode {
        Opcode::ReadRequest
    }

    fn min_len() -> usize {
        ATT_HANDLE_PDU_LEN
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        let handle = read_handle(&mut cursor)?;

        Ok(Self { handle })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ATT_HANDLE_PDU_LEN);

        packet.push(Self::opcode().value());
        packet.extend_from_slice(&self.handle.to_le_bytes());

        packet
    }
}

/// Read response packet
///
/// Carries no handle; it answers the oldest outstanding read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    /// Attribute value
    pub value: Vec<u8>,
}

impl AttPacket for ReadResponse {
    fn opcode() -> Opcode {
        Opcode::ReadResponse
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        Ok(Self {
            value: data[1..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(1 + self.value.len());

        packet.push(Self::opcode().value());
        packet.extend_from_slice(&self.value);

        packet
    }
}

/// Write request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Attribute handle
    pub handle: Handle,
    /// Value to write
    pub value: Vec<u8>,
}

impl AttPacket for WriteRequest {
    fn opcode() -> Opcode {
        Opcode::WriteRequest
    }

    fn min_len() -> usize {
        ATT_HANDLE_PDU_LEN
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        let handle = read_handle(&mut cursor)?;

        Ok(Self {
            handle,
            value: data[ATT_HANDLE_PDU_LEN..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ATT_HANDLE_PDU_LEN + self.value.len());

        packet.push(Self::opcode().value());
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.extend_from_slice(&self.value);

        packet
    }
}

/// Write response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse;

impl AttPacket for WriteResponse {
    fn opcode() -> Opcode {
        Opcode::WriteResponse
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode().value()]
    }
}

/// Write command packet (no response)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    /// Attribute handle
    pub handle: Handle,
    /// Value to write
    pub value: Vec<u8>,
}

impl AttPacket for WriteCommand {
    fn opcode() -> Opcode {
        Opcode::WriteCommand
    }

    fn min_len() -> usize {
        ATT_HANDLE_PDU_LEN
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        let handle = read_handle(&mut cursor)?;

        Ok(Self {
            handle,
            value: data[ATT_HANDLE_PDU_LEN..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ATT_HANDLE_PDU_LEN + self.value.len());

        packet.push(Self::opcode().value());
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.extend_from_slice(&self.value);

        packet
    }
}

/// Find by type value request packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindByTypeValueRequest {
    /// First requested handle
    pub start_handle: Handle,
    /// Last requested handle
    pub end_handle: Handle,
    /// Attribute type (16-bit UUID)
    pub attribute_type: u16,
    /// Attribute value to match
    pub attribute_value: Vec<u8>,
}

impl AttPacket for FindByTypeValueRequest {
    fn opcode() -> Opcode {
        Opcode::FindByTypeValueRequest
    }

    fn min_len() -> usize {
        ATT_FIND_BY_TYPE_VALUE_REQ_LEN
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        let start_handle = read_handle(&mut cursor)?;
        let end_handle = read_handle(&mut cursor)?;
        let attribute_type = read_u16(&mut cursor)?;

        Ok(Self {
            start_handle,
            end_handle,
            attribute_type,
            attribute_value: data[ATT_FIND_BY_TYPE_VALUE_REQ_LEN..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet =
            Vec::with_capacity(ATT_FIND_BY_TYPE_VALUE_REQ_LEN + self.attribute_value.len());

        packet.push(Self::opcode().value());
        packet.extend_from_slice(&self.start_handle.to_le_bytes());
        packet.extend_from_slice(&self.end_handle.to_le_bytes());
        packet.extend_from_slice(&self.attribute_type.to_le_bytes());
        packet.extend_from_slice(&self.attribute_value);

        packet
    }
}

/// Handle value notification packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueNotification {
    /// Attribute handle
    pub handle: Handle,
    /// Attribute value
    pub value: Vec<u8>,
}

impl AttPacket for HandleValueNotification {
    fn opcode() -> Opcode {
        Opcode::HandleValueNotification
    }

    fn min_len() -> usize {
        ATT_HANDLE_PDU_LEN
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        let handle = read_handle(&mut cursor)?;

        Ok(Self {
            handle,
            value: data[ATT_HANDLE_PDU_LEN..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ATT_HANDLE_PDU_LEN + self.value.len());

        packet.push(Self::opcode().value());
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.extend_from_slice(&self.value);

        packet
    }
}

/// Handle value indication packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueIndication {
    /// Attribute handle
    pub handle: Handle,
    /// Attribute value
    pub value: Vec<u8>,
}

impl AttPacket for HandleValueIndication {
    fn opcode() -> Opcode {
        Opcode::HandleValueIndication
    }

    fn min_len() -> usize {
        ATT_HANDLE_PDU_LEN
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;

        let mut cursor = Cursor::new(data);
        cursor.set_position(1);
        let handle = read_handle(&mut cursor)?;

        Ok(Self {
            handle,
            value: data[ATT_HANDLE_PDU_LEN..].to_vec(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(ATT_HANDLE_PDU_LEN + self.value.len());

        packet.push(Self::opcode().value());
        packet.extend_from_slice(&self.handle.to_le_bytes());
        packet.extend_from_slice(&self.value);

        packet
    }
}

/// Handle value confirmation packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleValueConfirmation;

impl AttPacket for HandleValueConfirmation {
    fn opcode() -> Opcode {
        Opcode::HandleValueConfirmation
    }

    fn parse(data: &[u8]) -> AttResult<Self> {
        check_header::<Self>(data)?;
        Ok(Self)
    }

    fn serialize(&self) -> Vec<u8> {
        vec![Self::opcode().value()]
    }
}
