//! Error handling for the ATT protocol
use super::constants::*;
use super::opcode::Opcode;
use super::types::Handle;
use crate::l2cap::L2capError;
use std::convert::TryFrom;
use thiserror::Error;

/// ATT error codes
///
/// Only the codes listed here are accepted from the wire; anything else in an
/// error response is a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttErrorCode {
    /// Invalid handle
    InvalidHandle,
    /// Read not permitted
    ReadNotPermitted,
    /// Write not permitted
    WriteNotPermitted,
    /// Invalid PDU
    InvalidPdu,
    /// Insufficient authentication
    InsufficientAuthentication,
    /// Request not supported
    RequestNotSupported,
    /// Invalid offset
    InvalidOffset,
    /// Insufficient authorization
    InsufficientAuthorization,
    /// Prepare queue full
    PrepareQueueFull,
    /// Attribute not found
    AttributeNotFound,
    /// Attribute not long
    AttributeNotLong,
    /// Insufficient encryption key size
    InsufficientEncryptionKeySize,
    /// Invalid attribute value length
    InvalidAttributeValueLength,
    /// Unlikely error
    Unlikely,
    /// Insufficient encryption
    InsufficientEncryption,
    /// Unsupported group type
    UnsupportedGroupType,
    /// Insufficient resources
    InsufficientResources,
    /// Database out of sync
    DatabaseOutOfSync,
    /// Value not allowed
    ValueNotAllowed,
    /// Application error
    ApplicationError,
}

impl AttErrorCode {
    /// Every registered error code, in wire-value order
    pub const ALL: [AttErrorCode; 20] = [
        AttErrorCode::InvalidHandle,
        AttErrorCode::ReadNotPermitted,
        AttErrorCode::WriteNotPermitted,
        AttErrorCode::InvalidPdu,
        AttErrorCode::InsufficientAuthentication,
        AttErrorCode::RequestNotSupported,
        AttErrorCode::InvalidOffset,
        AttErrorCode::InsufficientAuthorization,
        AttErrorCode::PrepareQueueFull,
        AttErrorCode::AttributeNotFound,
        AttErrorCode::AttributeNotLong,
        AttErrorCode::InsufficientEncryptionKeySize,
        AttErrorCode::InvalidAttributeValueLength,
        AttErrorCode::Unlikely,
        AttErrorCode::InsufficientEncryption,
        AttErrorCode::UnsupportedGroupType,
        AttErrorCode::InsufficientResources,
        AttErrorCode::DatabaseOutOfSync,
        AttErrorCode::ValueNotAllowed,
        AttErrorCode::ApplicationError,
    ];

    /// Wire value of this error code
    pub fn value(self) -> u8 {
        match self {
            AttErrorCode::InvalidHandle => ATT_ERROR_INVALID_HANDLE,
            AttErrorCode::ReadNotPermitted => ATT_ERROR_READ_NOT_PERMITTED,
            AttErrorCode::WriteNotPermitted => ATT_ERROR_WRITE_NOT_PERMITTED,
            AttErrorCode::InvalidPdu => ATT_ERROR_INVALID_PDU,
            AttErrorCode::InsufficientAuthentication => ATT_ERROR_INSUFFICIENT_AUTHENTICATION,
            AttErrorCode::RequestNotSupported => ATT_ERROR_REQUEST_NOT_SUPPORTED,
            AttErrorCode::InvalidOffset => ATT_ERROR_INVALID_OFFSET,
            AttErrorCode::InsufficientAuthorization => ATT_ERROR_INSUFFICIENT_AUTHORIZATION,
            AttErrorCode::PrepareQueueFull => ATT_ERROR_PREPARE_QUEUE_FULL,
            AttErrorCode::AttributeNotFound => ATT_ERROR_ATTRIBUTE_NOT_FOUND,
            AttErrorCode::AttributeNotLong => ATT_ERROR_ATTRIBUTE_NOT_LONG,
            AttErrorCode::InsufficientEncryptionKeySize => {
                ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE
            }
            AttErrorCode::InvalidAttributeValueLength => ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH,
            AttErrorCode::Unlikely => ATT_ERROR_UNLIKELY,
            AttErrorCode::InsufficientEncryption => ATT_ERROR_INSUFFICIENT_ENCRYPTION,
            AttErrorCode::UnsupportedGroupType => ATT_ERROR_UNSUPPORTED_GROUP_TYPE,
            AttErrorCode::InsufficientResources => ATT_ERROR_INSUFFICIENT_RESOURCES,
            AttErrorCode::DatabaseOutOfSync => ATT_ERROR_DATABASE_OUT_OF_SYNC,
            AttErrorCode::ValueNotAllowed => ATT_ERROR_VALUE_NOT_ALLOWED,
            AttErrorCode::ApplicationError => ATT_ERROR_APPLICATION_ERROR,
        }
    }

    /// Check whether a raw byte is a registered error code
    pub fn is_registered(code: u8) -> bool {
        AttErrorCode::try_from(code).is_ok()
    }
}

impl TryFrom<u8> for AttErrorCode {
    type Error = AttError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let error_code = match code {
            ATT_ERROR_INVALID_HANDLE => AttErrorCode::InvalidHandle,
            ATT_ERROR_READ_NOT_PERMITTED => AttErrorCode::ReadNotPermitted,
            ATT_ERROR_WRITE_NOT_PERMITTED => AttErrorCode::WriteNotPermitted,
            ATT_ERROR_INVALID_PDU => AttErrorCode::InvalidPdu,
            ATT_ERROR_INSUFFICIENT_AUTHENTICATION => AttErrorCode::InsufficientAuthentication,
            ATT_ERROR_REQUEST_NOT_SUPPORTED => AttErrorCode::RequestNotSupported,
            ATT_ERROR_INVALID_OFFSET => AttErrorCode::InvalidOffset,
            ATT_ERROR_INSUFFICIENT_AUTHORIZATION => AttErrorCode::InsufficientAuthorization,
            ATT_ERROR_PREPARE_QUEUE_FULL => AttErrorCode::PrepareQueueFull,
            ATT_ERROR_ATTRIBUTE_NOT_FOUND => AttErrorCode::AttributeNotFound,
            ATT_ERROR_ATTRIBUTE_NOT_LONG => AttErrorCode::AttributeNotLong,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE => {
                AttErrorCode::InsufficientEncryptionKeySize
            }
            ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH => AttErrorCode::InvalidAttributeValueLength,
            ATT_ERROR_UNLIKELY => AttErrorCode::Unlikely,
            ATT_ERROR_INSUFFICIENT_ENCRYPTION => AttErrorCode::InsufficientEncryption,
            ATT_ERROR_UNSUPPORTED_GROUP_TYPE => AttErrorCode::UnsupportedGroupType,
            ATT_ERROR_INSUFFICIENT_RESOURCES => AttErrorCode::InsufficientResources,
            ATT_ERROR_DATABASE_OUT_OF_SYNC => AttErrorCode::DatabaseOutOfSync,
            ATT_ERROR_VALUE_NOT_ALLOWED => AttErrorCode::ValueNotAllowed,
            ATT_ERROR_APPLICATION_ERROR => AttErrorCode::ApplicationError,
            other => return Err(AttError::UnknownErrorCode(other)),
        };
        Ok(error_code)
    }
}

impl From<AttErrorCode> for u8 {
    fn from(code: AttErrorCode) -> Self {
        code.value()
    }
}

/// ATT Error type
#[derive(Debug, Error)]
pub enum AttError {
    #[error("Truncated frame: expected at least {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("Unknown error code: 0x{0:02X}")]
    UnknownErrorCode(u8),

    #[error("Unexpected opcode: expected {expected}, got {actual}")]
    UnexpectedOpcode { expected: Opcode, actual: Opcode },

    #[error("Invalid handle: 0x{0:X}")]
    InvalidHandle(u32),

    #[error("ATT error {code:?} for {request} on handle {handle}")]
    Protocol {
        request: Opcode,
        handle: Handle,
        code: AttErrorCode,
    },

    #[error("Read timed out on handle {0}")]
    ReadTimeout(Handle),

    #[error("Write timed out on handle {0}")]
    WriteTimeout(Handle),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("L2CAP error: {0}")]
    L2cap(#[from] L2capError),
}

impl AttError {
    /// Whether this error came from decoding a malformed frame
    ///
    /// Decode errors never tear down the connection.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            AttError::TruncatedFrame { .. }
                | AttError::UnknownOpcode(_)
                | AttError::UnknownErrorCode(_)
                | AttError::UnexpectedOpcode { .. }
        )
    }

    /// Whether this error is a request timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttError::ReadTimeout(_) | AttError::WriteTimeout(_))
    }

    /// Get the protocol error code, if the peer answered with one
    pub fn error_code(&self) -> Option<AttErrorCode> {
        match self {
            AttError::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Get the handle associated with this error, if any
    pub fn handle(&self) -> Option<Handle> {
        match self {
            AttError::Protocol { handle, .. } => Some(*handle),
            AttError::ReadTimeout(handle) | AttError::WriteTimeout(handle) => Some(*handle),
            _ => None,
        }
    }
}

/// ATT Result type
pub type AttResult<T> = Result<T, AttError>;
