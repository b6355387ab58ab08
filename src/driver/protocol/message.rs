//! Message type codes and the small enums carried inside messages

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};

/// Message headers: `u16` key to opaque bytes.
pub type Headers = BTreeMap<u16, Bytes>;

/// Well-known request header keys.
pub mod header {
    pub const IMPLICIT_LIMIT: u16 = 0xFF01;
    pub const IMPLICIT_TYPENAMES: u16 = 0xFF02;
    pub const IMPLICIT_TYPEIDS: u16 = 0xFF03;
    pub const ALLOW_CAPABILITIES: u16 = 0xFF04;
    pub const EXPLICIT_OBJECTIDS: u16 = 0xFF05;
}

/// `DescribeStatement` aspect requesting both type descriptors.
pub const ASPECT_DATA_DESCRIPTION: u8 = 0x54;

/// Messages sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientMessage {
    Prepare = 0x50,
    DescribeStatement = 0x44,
    Execute = 0x45,
    OptimisticExecute = 0x4F,
    ExecuteScript = 0x51,
    Sync = 0x53,
}

/// Messages sent by the server that the query flow understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerMessage {
    PrepareComplete = 0x31,
    CommandComplete = 0x43,
    Data = 0x44,
    ErrorResponse = 0x45,
    LogMessage = 0x4C,
    ParameterStatus = 0x53,
    CommandDataDescription = 0x54,
    ReadyForCommand = 0x5A,
}

impl TryFrom<u8> for ServerMessage {
    type Error = DriverError;

    fn try_from(value: u8) -> DriverResult<Self> {
        Ok(match value {
            0x31 => ServerMessage::PrepareComplete,
            0x43 => ServerMessage::CommandComplete,
            0x44 => ServerMessage::Data,
            0x45 => ServerMessage::ErrorResponse,
            0x4C => ServerMessage::LogMessage,
            0x53 => ServerMessage::ParameterStatus,
            0x54 => ServerMessage::CommandDataDescription,
            0x5A => ServerMessage::ReadyForCommand,
            other => {
                return Err(DriverError::ProtocolViolation(format!(
                    "unexpected message type: 0x{:02x}",
                    other
                )))
            }
        })
    }
}

/// Result cardinality as encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Cardinality {
    NoResult = 0x6E,
    AtMostOne = 0x6F,
    One = 0x41,
    Many = 0x6D,
    AtLeastOne = 0x4D,
}

impl Cardinality {
    /// Whether an object-shape element with this cardinality is always present.
    pub fn is_required(self) -> bool {
        matches!(self, Cardinality::One | Cardinality::AtLeastOne)
    }
}

impl TryFrom<u8> for Cardinality {
    type Error = DriverError;

    fn try_from(value: u8) -> DriverResult<Self> {
        Ok(match value {
            0x6E => Cardinality::NoResult,
            0x6F => Cardinality::AtMostOne,
            0x41 => Cardinality::One,
            0x6D => Cardinality::Many,
            0x4D => Cardinality::AtLeastOne,
            other => {
                return Err(DriverError::Descriptor(format!(
                    "unknown cardinality 0x{:02x}",
                    other
                )))
            }
        })
    }
}

/// Output format requested for result data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum IoFormat {
    #[default]
    Binary = 0x62,
    Json = 0x6A,
}

/// Transaction state reported by `ReadyForCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    NotInTransaction,
    InTransaction,
    InFailedTransaction,
}

impl TryFrom<u8> for TransactionState {
    type Error = DriverError;

    fn try_from(value: u8) -> DriverResult<Self> {
        match value {
            0x49 => Ok(TransactionState::NotInTransaction),
            0x54 => Ok(TransactionState::InTransaction),
            0x45 => Ok(TransactionState::InFailedTransaction),
            other => Err(DriverError::ProtocolViolation(format!(
                "unknown transaction state 0x{:02x}",
                other
            ))),
        }
    }
}
