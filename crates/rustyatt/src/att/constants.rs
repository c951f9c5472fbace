//! ATT Protocol constants

use std::time::Duration;

// ATT opcode values
pub const ATT_ERROR_RSP: u8 = 0x01;
pub const ATT_EXCHANGE_MTU_REQ: u8 = 0x02;
pub const ATT_EXCHANGE_MTU_RSP: u8 = 0x03;
pub const ATT_FIND_INFO_REQ: u8 = 0x04;
pub const ATT_FIND_INFO_RSP: u8 = 0x05;
pub const ATT_FIND_BY_TYPE_VALUE_REQ: u8 = 0x06;
pub const ATT_FIND_BY_TYPE_VALUE_RSP: u8 = 0x07;
pub const ATT_READ_BY_TYPE_REQ: u8 = 0x08;
pub const ATT_READ_BY_TYPE_RSP: u8 = 0x09;
pub const ATT_READ_REQ: u8 = 0x0A;
pub const ATT_READ_RSP: u8 = 0x0B;
pub const ATT_READ_BLOB_REQ: u8 = 0x0C;
pub const ATT_READ_BLOB_RSP: u8 = 0x0D;
pub const ATT_READ_MULTIPLE_REQ: u8 = 0x0E;
pub const ATT_READ_MULTIPLE_RSP: u8 = 0x0F;
pub const ATT_READ_BY_GROUP_TYPE_REQ: u8 = 0x10;
pub const ATT_READ_BY_GROUP_TYPE_RSP: u8 = 0x11;
pub const ATT_WRITE_REQ: u8 = 0x12;
pub const ATT_WRITE_RSP: u8 = 0x13;
pub const ATT_PREPARE_WRITE_REQ: u8 = 0x16;
pub const ATT_PREPARE_WRITE_RSP: u8 = 0x17;
pub const ATT_EXECUTE_WRITE_REQ: u8 = 0x18;
pub const ATT_EXECUTE_WRITE_RSP: u8 = 0x19;
pub const ATT_HANDLE_VALUE_NTF: u8 = 0x1B;
pub const ATT_HANDLE_VALUE_IND: u8 = 0x1D;
pub const ATT_HANDLE_VALUE_CONF: u8 = 0x1E;
pub const ATT_READ_MULTIPLE_VARIABLE_REQ: u8 = 0x20;
pub const ATT_READ_MULTIPLE_VARIABLE_RSP: u8 = 0x21;
pub const ATT_MULTIPLE_HANDLE_VALUE_NTF: u8 = 0x23;
pub const ATT_WRITE_CMD: u8 = 0x52;
pub const ATT_SIGNED_WRITE_CMD: u8 = 0xD2;

// ATT error codes
pub const ATT_ERROR_INVALID_HANDLE: u8 = 0x01;
pub const ATT_ERROR_READ_NOT_PERMITTED: u8 = 0x02;
pub const ATT_ERROR_WRITE_NOT_PERMITTED: u8 = 0x03;
pub const ATT_ERROR_INVALID_PDU: u8 = 0x04;
pub const ATT_ERROR_INSUFFICIENT_AUTHENTICATION: u8 = 0x05;
pub const ATT_ERROR_REQUEST_NOT_SUPPORTED: u8 = 0x06;
pub const ATT_ERROR_INVALID_OFFSET: u8 = 0x07;
pub const ATT_ERROR_INSUFFICIENT_AUTHORIZATION: u8 = 0x08;
pub const ATT_ERROR_PREPARE_QUEUE_FULL: u8 = 0x09;
pub const ATT_ERROR_ATTRIBUTE_NOT_FOUND: u8 = 0x0A;
pub const ATT_ERROR_ATTRIBUTE_NOT_LONG: u8 = 0x0B;
pub const ATT_ERROR_INSUFFICIENT_ENCRYPTION_KEY_SIZE: u8 = 0x0C;
pub const ATT_ERROR_INVALID_ATTRIBUTE_VALUE_LENGTH: u8 = 0x0D;
pub const ATT_ERROR_UNLIKELY: u8 = 0x0E;
pub const ATT_ERROR_INSUFFICIENT_ENCRYPTION: u8 = 0x0F;
pub const ATT_ERROR_UNSUPPORTED_GROUP_TYPE: u8 = 0x10;
pub const ATT_ERROR_INSUFFICIENT_RESOURCES: u8 = 0x11;
pub const ATT_ERROR_DATABASE_OUT_OF_SYNC: u8 = 0x12;
pub const ATT_ERROR_VALUE_NOT_ALLOWED: u8 = 0x13;
pub const ATT_ERROR_APPLICATION_ERROR: u8 = 0x80;

// ATT handle values
pub const ATT_HANDLE_MAX: u16 = 0xFFFF;

// Minimum PDU lengths, opcode included
pub const ATT_ERROR_RSP_LEN: usize = 5;
pub const ATT_HANDLE_PDU_LEN: usize = 3; // Opcode (1) + handle (2)
pub const ATT_FIND_BY_TYPE_VALUE_REQ_LEN: usize = 7;

// Client Characteristic Configuration values
pub const ATT_CCC_NONE: u16 = 0x0000;
pub const ATT_CCC_NOTIFY: u16 = 0x0001;
pub const ATT_CCC_INDICATE: u16 = 0x0002;

// ATT L2CAP channel ID
pub const ATT_CID: u16 = 0x0004;

/// ATT transaction timeout
pub const ATT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Depth of the client command channel
pub const ATT_COMMAND_QUEUE_DEPTH: usize = 32;
