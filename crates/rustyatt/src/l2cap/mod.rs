//! L2CAP transport for the ATT client
//!
//! Only the pieces needed to carry ATT are provided: Bluetooth device
//! addresses, L2CAP socket addresses and a Linux `SOCK_SEQPACKET` socket that
//! implements [`AttTransport`](crate::att::AttTransport).

pub mod constants;
pub mod types;
pub mod socket;

// Re-export the public API
pub use self::types::*;
pub use self::socket::L2capSocket;
