//! Connection handshake blocks.
//!
//! The handshake runs before any framed request:
//!
//! ```text
//! client                               broker
//!   | -- driver info (10 bytes) -------->  |
//!   | <-------- i32 port reply ----------  |   <0 rejected, 0 stay, >0 redirect
//!   | -- database info (96 bytes) ------>  |   (on the redirect port, if any)
//!   | <-------- broker info (4 bytes) ---  |
//! ```

use crate::error::ProtocolError;

/// Magic string opening the driver info block.
pub const MAGIC: &[u8; 5] = b"CUBRK";

/// Size of the driver info block.
pub const DRIVER_INFO_SIZE: usize = 10;

/// Size of one database info field.
pub const DB_INFO_FIELD_SIZE: usize = 32;

/// Size of the database info block.
pub const DB_INFO_SIZE: usize = 3 * DB_INFO_FIELD_SIZE;

/// Size of the broker info reply.
pub const BROKER_INFO_SIZE: usize = 4;

/// Marks the protocol byte as a versioned protocol indicator.
pub const CAS_PROTO_INDICATOR: u8 = 0x40;

/// Protocol version spoken by this driver.
pub const CAS_PROTOCOL_VERSION: u8 = 0x01;

/// Client kind announced in the driver info block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClientType {
    /// ODBC driver.
    Odbc = 1,
    /// Native call interface.
    #[default]
    Cci = 2,
    /// JDBC driver.
    Jdbc = 3,
}

/// The 10-byte block that opens every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    /// Client kind.
    pub client_type: ClientType,
    /// Protocol version without the indicator bit.
    pub protocol_version: u8,
}

impl Default for DriverInfo {
    fn default() -> Self {
        Self {
            client_type: ClientType::default(),
            protocol_version: CAS_PROTOCOL_VERSION,
        }
    }
}

impl DriverInfo {
    /// Encode the block.
    #[must_use]
    pub fn encode(&self) -> [u8; DRIVER_INFO_SIZE] {
        let mut block = [0u8; DRIVER_INFO_SIZE];
        block[..MAGIC.len()].copy_from_slice(MAGIC);
        block[5] = self.client_type as u8;
        block[6] = CAS_PROTO_INDICATOR | self.protocol_version;
        block
    }

    /// Decode a block received from a client.
    pub fn decode(block: &[u8]) -> Result<Self, ProtocolError> {
        if block.len() != DRIVER_INFO_SIZE || &block[..MAGIC.len()] != MAGIC {
            return Err(ProtocolError::InvalidHandshake(
                "missing driver magic".into(),
            ));
        }
        let client_type = match block[5] {
            1 => ClientType::Odbc,
            2 => ClientType::Cci,
            3 => ClientType::Jdbc,
            other => {
                return Err(ProtocolError::InvalidHandshake(format!(
                    "unknown client type {other}"
                )));
            }
        };
        Ok(Self {
            client_type,
            protocol_version: block[6] & !CAS_PROTO_INDICATOR,
        })
    }
}

/// The broker's answer to the driver info block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortReply {
    /// Continue on the current socket.
    Stay,
    /// Close and reconnect to this port on the same host.
    Redirect(u16),
    /// The broker refused the connection.
    Rejected(i32),
}

impl PortReply {
    /// Interpret the raw reply integer.
    pub fn from_i32(value: i32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Stay),
            v if v < 0 => Ok(Self::Rejected(v)),
            v => u16::try_from(v)
                .map(Self::Redirect)
                .map_err(|_| ProtocolError::InvalidHandshake(format!("redirect port {v}"))),
        }
    }

    /// Encode as the raw reply integer.
    #[must_use]
    pub fn to_i32(self) -> i32 {
        match self {
            Self::Stay => 0,
            Self::Redirect(port) => i32::from(port),
            Self::Rejected(code) => code,
        }
    }
}

/// The 96-byte database info block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbInfo {
    /// Database name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl DbInfo {
    /// Create a database info block.
    pub fn new(
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Encode the block; every field must fit its 32-byte slot.
    pub fn encode(&self) -> Result<[u8; DB_INFO_SIZE], ProtocolError> {
        let mut block = [0u8; DB_INFO_SIZE];
        let fields = [
            ("database", &self.database),
            ("user", &self.user),
            ("password", &self.password),
        ];
        for (slot, (field, value)) in fields.into_iter().enumerate() {
            let bytes = value.as_bytes();
            if bytes.len() > DB_INFO_FIELD_SIZE {
                return Err(ProtocolError::FieldTooLong {
                    field,
                    len: bytes.len(),
                    max: DB_INFO_FIELD_SIZE,
                });
            }
            let start = slot * DB_INFO_FIELD_SIZE;
            block[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Ok(block)
    }

    /// Decode a block received from a client.
    pub fn decode(block: &[u8]) -> Result<Self, ProtocolError> {
        if block.len() < DB_INFO_SIZE {
            return Err(ProtocolError::InvalidHandshake(format!(
                "database info is {} bytes",
                block.len()
            )));
        }
        let field = |slot: usize| -> Result<String, ProtocolError> {
            let raw = &block[slot * DB_INFO_FIELD_SIZE..(slot + 1) * DB_INFO_FIELD_SIZE];
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            String::from_utf8(raw[..end].to_vec()).map_err(|_| ProtocolError::InvalidString)
        };
        Ok(Self {
            database: field(0)?,
            user: field(1)?,
            password: field(2)?,
        })
    }
}

/// Session properties announced by the broker at the end of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerInfo {
    /// DBMS type byte.
    pub dbms_type: u8,
    /// Whether the CAS keeps the socket open across transactions.
    pub keep_connection: bool,
    /// Whether the CAS pools prepared statements.
    pub statement_pooling: bool,
    /// Reserved byte.
    pub reserved: u8,
}

impl BrokerInfo {
    /// Decode the 4-byte reply.
    #[must_use]
    pub fn decode(block: [u8; BROKER_INFO_SIZE]) -> Self {
        Self {
            dbms_type: block[0],
            keep_connection: block[1] == 1,
            statement_pooling: block[2] == 1,
            reserved: block[3],
        }
    }

    /// Encode the 4-byte reply.
    #[must_use]
    pub fn encode(&self) -> [u8; BROKER_INFO_SIZE] {
        [
            self.dbms_type,
            u8::from(self.keep_connection),
            u8::from(self.statement_pooling),
            self.reserved,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_info_layout() {
        let block = DriverInfo::default().encode();
        assert_eq!(&block[..5], b"CUBRK");
        assert_eq!(block[5], ClientType::Cci as u8);
        assert_eq!(block[6], 0x41);
        assert_eq!(&block[7..], &[0, 0, 0]);
        assert_eq!(DriverInfo::decode(&block).unwrap(), DriverInfo::default());
    }

    #[test]
    fn test_port_reply() {
        assert_eq!(PortReply::from_i32(0).unwrap(), PortReply::Stay);
        assert_eq!(PortReply::from_i32(33001).unwrap(), PortReply::Redirect(33001));
        assert_eq!(PortReply::from_i32(-1).unwrap(), PortReply::Rejected(-1));
        assert!(PortReply::from_i32(70_000).is_err());
    }

    #[test]
    fn test_db_info_offsets() {
        let block = DbInfo::new("demodb", "dba", "secret").encode().unwrap();
        assert_eq!(&block[0..6], b"demodb");
        assert_eq!(block[6], 0);
        assert_eq!(&block[32..35], b"dba");
        assert_eq!(&block[64..70], b"secret");

        let decoded = DbInfo::decode(&block).unwrap();
        assert_eq!(decoded.user, "dba");
    }

    #[test]
    fn test_db_info_field_limit() {
        let exact = "x".repeat(32);
        assert!(DbInfo::new(exact.as_str(), "u", "p").encode().is_ok());

        let err = DbInfo::new("db", "u".repeat(33), "p").encode().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FieldTooLong {
                field: "user",
                len: 33,
                max: 32
            }
        );
    }

    #[test]
    fn test_broker_info_flags() {
        let info = BrokerInfo::decode([0, 1, 0, 0]);
        assert!(info.keep_connection);
        assert!(!info.statement_pooling);
        assert_eq!(BrokerInfo::decode(info.encode()), info);
    }
}
