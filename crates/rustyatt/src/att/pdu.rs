//! ATT PDU codec
//!
//! Stateless translation between wire frames and [`AttPdu`] values. Every PDU
//! returned by [`decode`] carries a registered opcode, and error responses
//! carry a registered request opcode and error code.

use super::error::{AttError, AttErrorCode, AttResult};
use super::opcode::Opcode;
use super::types::*;
use std::convert::TryFrom;

/// A decoded ATT PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttPdu {
    ErrorResponse(ErrorResponse),
    ReadRequest(ReadRequest),
    ReadResponse(ReadResponse),
    WriteRequest(WriteRequest),
    WriteResponse,
    FindByTypeValueRequest(FindByTypeValueRequest),
    HandleValueNotification(HandleValueNotification),
    HandleValueIndication(HandleValueIndication),
    /// Any other registered opcode, with its raw parameters
    Unknown { opcode: Opcode, params: Vec<u8> },
}

impl AttPdu {
    /// Opcode tag of this PDU
    pub fn opcode(&self) -> Opcode {
        match self {
            AttPdu::ErrorResponse(_) => Opcode::ErrorResponse,
            AttPdu::ReadRequest(_) => Opcode::ReadRequest,
            AttPdu::ReadResponse(_) => Opcode::ReadResponse,
            AttPdu::WriteRequest(_) => Opcode::WriteRequest,
            AttPdu::WriteResponse => Opcode::WriteResponse,
            AttPdu::FindByTypeValueRequest(_) => Opcode::FindByTypeValueRequest,
            AttPdu::HandleValueNotification(_) => Opcode::HandleValueNotification,
            AttPdu::HandleValueIndication(_) => Opcode::HandleValueIndication,
            AttPdu::Unknown { opcode, .. } => *opcode,
        }
    }
}

/// Decode one frame into a PDU
pub fn decode(data: &[u8]) -> AttResult<AttPdu> {
    let first = *data.first().ok_or(AttError::TruncatedFrame {
        expected: 1,
        actual: 0,
    })?;
    let opcode = Opcode::try_from(first)?;

    let pdu = match opcode {
        Opcode::ErrorResponse => AttPdu::ErrorResponse(ErrorResponse::parse(data)?),
        Opcode::ReadRequest => AttPdu::ReadRequest(ReadRequest::parse(data)?),
        Opcode::ReadResponse => AttPdu::ReadResponse(ReadResponse::parse(data)?),
        Opcode::WriteRequest => AttPdu::WriteRequest(WriteRequest::parse(data)?),
        Opcode::WriteResponse => {
            WriteResponse::parse(data)?;
            AttPdu::WriteResponse
        }
        Opcode::FindByTypeValueRequest => {
            AttPdu::FindByTypeValueRequest(FindByTypeValueRequest::parse(data)?)
        }
        Opcode::HandleValueNotification => {
            AttPdu::HandleValueNotification(HandleValueNotification::parse(data)?)
        }
        Opcode::HandleValueIndication => {
            AttPdu::HandleValueIndication(HandleValueIndication::parse(data)?)
        }
        other => AttPdu::Unknown {
            opcode: other,
            params: data[1..].to_vec(),
        },
    };

    Ok(pdu)
}

/// `[READ_REQ, handle_lo, handle_hi]`
pub fn encode_read_request(handle: Handle) -> Vec<u8> {
    ReadRequest { handle }.serialize()
}

/// `[WRITE_REQ, handle_lo, handle_hi, value...]`
pub fn encode_write_request(handle: Handle, value: &[u8]) -> Vec<u8> {
    WriteRequest {
        handle,
        value: value.to_vec(),
    }
    .serialize()
}

/// `[WRITE_CMD, handle_lo, handle_hi, value...]`
pub fn encode_write_command(handle: Handle, value: &[u8]) -> Vec<u8> {
    WriteCommand {
        handle,
        value: value.to_vec(),
    }
    .serialize()
}

/// Write request enabling notifications: `[0x01, 0x00]` written to `handle`
pub fn encode_enable_notification(handle: Handle) -> Vec<u8> {
    encode_write_request(handle, &ClientConfiguration::NOTIFY.to_value())
}

/// `[ERROR_RSP, request_opcode, handle_lo, handle_hi, error_code]`
pub fn encode_error_response(
    request_opcode: Opcode,
    handle: Handle,
    error_code: AttErrorCode,
) -> Vec<u8> {
    ErrorResponse::new(request_opcode, handle, error_code).serialize()
}

/// `[HANDLE_VALUE_CFM]`
pub fn encode_handle_value_confirmation() -> Vec<u8> {
    HandleValueConfirmation.serialize()
}
