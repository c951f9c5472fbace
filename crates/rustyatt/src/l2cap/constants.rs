//! L2CAP socket constants

// Bluetooth socket constants
pub const AF_BLUETOOTH: i32 = 31;
pub const BTPROTO_L2CAP: i32 = 0;
pub const SOL_BLUETOOTH: i32 = 274;
pub const BT_SECURITY: i32 = 4;

// Address types for sockaddr_l2
pub const BDADDR_BREDR: u8 = 0x00;
pub const BDADDR_LE_PUBLIC: u8 = 0x01;
pub const BDADDR_LE_RANDOM: u8 = 0x02;

// Security levels for BT_SECURITY
pub const BT_SECURITY_SDP: u8 = 0;
pub const BT_SECURITY_LOW: u8 = 1;
pub const BT_SECURITY_MEDIUM: u8 = 2;
pub const BT_SECURITY_HIGH: u8 = 3;
pub const BT_SECURITY_FIPS: u8 = 4;

/// Largest frame read from the socket in one call
pub const READ_BUFFER_SIZE: usize = 4096;
