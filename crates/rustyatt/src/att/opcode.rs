//! ATT opcode registry
//!
//! The set of opcodes is closed: any byte that does not map to a variant of
//! [`Opcode`] is rejected by the codec.

use super::constants::*;
use super::error::AttError;
use std::convert::TryFrom;
use std::fmt;

/// ATT operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    ErrorResponse,
    ExchangeMtuRequest,
    ExchangeMtuResponse,
    FindInformationRequest,
    FindInformationResponse,
    FindByTypeValueRequest,
    FindByTypeValueResponse,
    ReadByTypeRequest,
    ReadByTypeResponse,
    ReadRequest,
    ReadResponse,
    ReadBlobRequest,
    ReadBlobResponse,
    ReadMultipleRequest,
    ReadMultipleResponse,
    ReadByGroupTypeRequest,
    ReadByGroupTypeResponse,
    WriteRequest,
    WriteResponse,
    PrepareWriteRequest,
    PrepareWriteResponse,
    ExecuteWriteRequest,
    ExecuteWriteResponse,
    HandleValueNotification,
    HandleValueIndication,
    HandleValueConfirmation,
    ReadMultipleVariableRequest,
    ReadMultipleVariableResponse,
    MultipleHandleValueNotification,
    WriteCommand,
    SignedWriteCommand,
}

impl Opcode {
    /// Every registered opcode, in wire-value order
    pub const ALL: [Opcode; 31] = [
        Opcode::ErrorResponse,
        Opcode::ExchangeMtuRequest,
        Opcode::ExchangeMtuResponse,
        Opcode::FindInformationRequest,
        Opcode::FindInformationResponse,
        Opcode::FindByTypeValueRequest,
        Opcode::FindByTypeValueResponse,
        Opcode::ReadByTypeRequest,
        Opcode::ReadByTypeResponse,
        Opcode::ReadRequest,
        Opcode::ReadResponse,
        Opcode::ReadBlobRequest,
        Opcode::ReadBlobResponse,
        Opcode::ReadMultipleRequest,
        Opcode::ReadMultipleResponse,
        Opcode::ReadByGroupTypeRequest,
        Opcode::ReadByGroupTypeResponse,
        Opcode::WriteRequest,
        Opcode::WriteResponse,
        Opcode::PrepareWriteRequest,
        Opcode::PrepareWriteResponse,
        Opcode::ExecuteWriteRequest,
        Opcode::ExecuteWriteResponse,
        Opcode::HandleValueNotification,
        Opcode::HandleValueIndication,
        Opcode::HandleValueConfirmation,
        Opcode::ReadMultipleVariableRequest,
        Opcode::ReadMultipleVariableResponse,
        Opcode::MultipleHandleValueNotification,
        Opcode::WriteCommand,
        Opcode::SignedWriteCommand,
    ];

    /// Wire value of this opcode
    pub fn value(self) -> u8 {
        match self {
            Opcode::ErrorResponse => ATT_ERROR_RSP,
            Opcode::ExchangeMtuRequest => ATT_EXCHANGE_MTU_REQ,
            Opcode::ExchangeMtuResponse => ATT_EXCHANGE_MTU_RSP,
            Opcode::FindInformationRequest => ATT_FIND_INFO_REQ,
            Opcode::FindInformationResponse => ATT_FIND_INFO_RSP,
            Opcode::FindByTypeValueRequest => ATT_FIND_BY_TYPE_VALUE_REQ,
            Opcode::FindByTypeValueResponse => ATT_FIND_BY_TYPE_VALUE_RSP,
            Opcode::ReadByTypeRequest => ATT_READ_BY_TYPE_REQ,
            Opcode::ReadByTypeResponse => ATT_READ_BY_TYPE_RSP,
            Opcode::ReadRequest => ATT_READ_REQ,
            Opcode::ReadResponse => ATT_READ_RSP,
            Opcode::ReadBlobRequest => ATT_READ_BLOB_REQ,
            Opcode::ReadBlobResponse => ATT_READ_BLOB_RSP,
            Opcode::ReadMultipleRequest => ATT_READ_MULTIPLE_REQ,
            Opcode::ReadMultipleResponse => ATT_READ_MULTIPLE_RSP,
            Opcode::ReadByGroupTypeRequest => ATT_READ_BY_GROUP_TYPE_REQ,
            Opcode::ReadByGroupTypeResponse => ATT_READ_BY_GROUP_TYPE_RSP,
            Opcode::WriteRequest => ATT_WRITE_REQ,
            Opcode::WriteResponse => ATT_WRITE_RSP,
            Opcode::PrepareWriteRequest => ATT_PREPARE_WRITE_REQ,
            Opcode::PrepareWriteResponse => ATT_PREPARE_WRITE_RSP,
            Opcode::ExecuteWriteRequest => ATT_EXECUTE_WRITE_REQ,
            Opcode::ExecuteWriteResponse => ATT_EXECUTE_WRITE_RSP,
            Opcode::HandleValueNotification => ATT_HANDLE_VALUE_NTF,
            Opcode::HandleValueIndication => ATT_HANDLE_VALUE_IND,
            Opcode::HandleValueConfirmation => ATT_HANDLE_VALUE_CONF,
            Opcode::ReadMultipleVariableRequest => ATT_READ_MULTIPLE_VARIABLE_REQ,
            Opcode::ReadMultipleVariableResponse => ATT_READ_MULTIPLE_VARIABLE_RSP,
            Opcode::MultipleHandleValueNotification => ATT_MULTIPLE_HANDLE_VALUE_NTF,
            Opcode::WriteCommand => ATT_WRITE_CMD,
            Opcode::SignedWriteCommand => ATT_SIGNED_WRITE_CMD,
        }
    }

    /// Check whether a raw byte is a registered opcode
    pub fn is_registered(value: u8) -> bool {
        Opcode::try_from(value).is_ok()
    }

    /// Whether the peer expects a response to this opcode
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Opcode::ExchangeMtuRequest
                | Opcode::FindInformationRequest
                | Opcode::FindByTypeValueRequest
                | Opcode::ReadByTypeRequest
                | Opcode::ReadRequest
                | Opcode::ReadBlobRequest
                | Opcode::ReadMultipleRequest
                | Opcode::ReadByGroupTypeRequest
                | Opcode::WriteRequest
                | Opcode::PrepareWriteRequest
                | Opcode::ExecuteWriteRequest
                | Opcode::ReadMultipleVariableRequest
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = AttError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let opcode = match value {
            ATT_ERROR_RSP => Opcode::ErrorResponse,
            ATT_EXCHANGE_MTU_REQ => Opcode::ExchangeMtuRequest,
            ATT_EXCHANGE_MTU_RSP => Opcode::ExchangeMtuResponse,
            ATT_FIND_INFO_REQ => Opcode::FindInformationRequest,
            ATT_FIND_INFO_RSP => Opcode::FindInformationResponse,
            ATT_FIND_BY_TYPE_VALUE_REQ => Opcode::FindByTypeValueRequest,
            ATT_FIND_BY_TYPE_VALUE_RSP => Opcode::FindByTypeValueResponse,
            ATT_READ_BY_TYPE_REQ => Opcode::ReadByTypeRequest,
            ATT_READ_BY_TYPE_RSP => Opcode::ReadByTypeResponse,
            ATT_READ_REQ => Opcode::ReadRequest,
            ATT_READ_RSP => Opcode::ReadResponse,
            ATT_READ_BLOB_REQ => Opcode::ReadBlobRequest,
            ATT_READ_BLOB_RSP => Opcode::ReadBlobResponse,
            ATT_READ_MULTIPLE_REQ => Opcode::ReadMultipleRequest,
            ATT_READ_MULTIPLE_RSP => Opcode::ReadMultipleResponse,
            ATT_READ_BY_GROUP_TYPE_REQ => Opcode::ReadByGroupTypeRequest,
            ATT_READ_BY_GROUP_TYPE_RSP => Opcode::ReadByGroupTypeResponse,
            ATT_WRITE_REQ => Opcode::WriteRequest,
            ATT_WRITE_RSP => Opcode::WriteResponse,
            ATT_PREPARE_WRITE_REQ => Opcode::PrepareWriteRequest,
            ATT_PREPARE_WRITE_RSP => Opcode::PrepareWriteResponse,
            ATT_EXECUTE_WRITE_REQ => Opcode::ExecuteWriteRequest,
            ATT_EXECUTE_WRITE_RSP => Opcode::ExecuteWriteResponse,
            ATT_HANDLE_VALUE_NTF => Opcode::HandleValueNotification,
            ATT_HANDLE_VALUE_IND => Opcode::HandleValueIndication,
            ATT_HANDLE_VALUE_CONF => Opcode::HandleValueConfirmation,
            ATT_READ_MULTIPLE_VARIABLE_REQ => Opcode::ReadMultipleVariableRequest,
            ATT_READ_MULTIPLE_VARIABLE_RSP => Opcode::ReadMultipleVariableResponse,
            ATT_MULTIPLE_HANDLE_VALUE_NTF => Opcode::MultipleHandleValueNotification,
            ATT_WRITE_CMD => Opcode::WriteCommand,
            ATT_SIGNED_WRITE_CMD => Opcode::SignedWriteCommand,
            other => return Err(AttError::UnknownOpcode(other)),
        };
        Ok(opcode)
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        opcode.value()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:02X})", self, self.value())
    }
}
