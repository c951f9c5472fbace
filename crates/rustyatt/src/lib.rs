//! RustyATT - A Rust client for the Bluetooth Attribute Protocol
//!
//! This library reads and writes attribute handles on a remote Bluetooth LE
//! peer and delivers value notifications to callbacks. It contains the ATT
//! PDU codec, an async transaction client, and an L2CAP socket transport for
//! Linux.

pub mod att;
pub mod l2cap;

// Re-export common types for convenience
pub use att::{
    AttClient, AttClientConfig, AttError, AttErrorCode, AttPdu, AttResult, AttTransport, Handle,
    Opcode,
};
pub use l2cap::{AddressType, BdAddr, L2capAddr, L2capError, L2capSocket, SecurityLevel};
