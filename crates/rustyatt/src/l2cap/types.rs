//! L2CAP address and error types

use super::constants::*;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// L2CAP error type
#[derive(Debug, Error)]
pub enum L2capError {
    #[error("Failed to open L2CAP socket: {0}")]
    SocketError(std::io::Error),

    #[error("Failed to bind L2CAP socket: {0}")]
    BindError(std::io::Error),

    #[error("Failed to set socket security: {0}")]
    SecurityError(std::io::Error),

    #[error("Failed to connect L2CAP socket: {0}")]
    ConnectError(std::io::Error),

    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    #[error("Invalid L2CAP port: {0}")]
    InvalidPort(u32),
}

/// L2CAP result type
pub type L2capResult<T> = std::result::Result<T, L2capError>;

/// Bluetooth device address, stored little-endian as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    /// The wildcard address `00:00:00:00:00:00`
    pub const ANY: BdAddr = BdAddr { bytes: [0; 6] };

    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl FromStr for BdAddr {
    type Err = L2capError;

    /// Parse `XX:XX:XX:XX:XX:XX`, most significant byte first
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || L2capError::InvalidAddress(s.to_string());

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            bytes[5 - i] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        Ok(Self { bytes })
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

/// Address type carried in `sockaddr_l2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressType {
    #[default]
    BrEdr,
    LePublic,
    LeRandom,
}

impl From<AddressType> for u8 {
    fn from(value: AddressType) -> Self {
        match value {
            AddressType::BrEdr => BDADDR_BREDR,
            AddressType::LePublic => BDADDR_LE_PUBLIC,
            AddressType::LeRandom => BDADDR_LE_RANDOM,
        }
    }
}

/// Socket security level requested with `BT_SECURITY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    Sdp,
    Low,
    Medium,
    High,
    Fips,
}

impl From<SecurityLevel> for u8 {
    fn from(value: SecurityLevel) -> Self {
        match value {
            SecurityLevel::Sdp => BT_SECURITY_SDP,
            SecurityLevel::Low => BT_SECURITY_LOW,
            SecurityLevel::Medium => BT_SECURITY_MEDIUM,
            SecurityLevel::High => BT_SECURITY_HIGH,
            SecurityLevel::Fips => BT_SECURITY_FIPS,
        }
    }
}

/// L2CAP socket address: device address, channel identifier and address type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2capAddr {
    pub bdaddr: BdAddr,
    pub cid: u16,
    pub address_type: AddressType,
}

impl L2capAddr {
    pub fn new(bdaddr: BdAddr, cid: u16, address_type: AddressType) -> Self {
        Self {
            bdaddr,
            cid,
            address_type,
        }
    }

    /// Build an address from its textual device address and a port
    ///
    /// Fails if the address is malformed or the port does not fit in 16 bits.
    pub fn parse(addr: &str, port: u32, address_type: AddressType) -> L2capResult<Self> {
        let bdaddr = addr.parse()?;
        let cid = u16::try_from(port).map_err(|_| L2capError::InvalidPort(port))?;
        Ok(Self::new(bdaddr, cid, address_type))
    }
}

impl fmt::Display for L2capAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cid 0x{:04X})", self.bdaddr, self.cid)
    }
}
