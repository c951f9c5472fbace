//! Attribute Protocol (ATT) client
//!
//! This module provides the ATT PDU codec and a transaction client that
//! correlates requests with responses, dispatches notifications to registered
//! callbacks and rejects the server requests it does not implement.

pub mod constants;
pub mod opcode;
pub mod types;
pub mod pdu;
pub mod error;
pub mod transport;
pub mod client;
#[cfg(test)]
mod tests;

// Re-export the public API
pub use self::client::{AttClient, AttClientConfig, NotificationCallback};
pub use self::error::{AttError, AttErrorCode, AttResult};
pub use self::opcode::Opcode;
pub use self::pdu::{
    decode, encode_enable_notification, encode_error_response, encode_read_request,
    encode_write_command, encode_write_request, AttPdu,
};
pub use self::transport::AttTransport;
pub use self::types::{AttPacket, ClientConfiguration, Handle};
