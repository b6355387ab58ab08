use bytes::Bytes;
use uuid::Uuid;

use super::buffer::RawMessage;
use super::error::ServerError;
use super::message::{Cardinality, ServerMessage, TransactionState};
use crate::error::{DriverError, DriverResult};

/// A decoded server message
#[derive(Debug, Clone)]
pub enum Response {
    /// Result of `Prepare`
    PrepareComplete {
        cardinality: Cardinality,
        input_id: Uuid,
        output_id: Uuid,
    },

    /// Result of `DescribeStatement`, or of an `OptimisticExecute` whose
    /// type IDs no longer match the server's
    CommandDataDescription {
        cardinality: Cardinality,
        input_id: Uuid,
        input: Bytes,
        output_id: Uuid,
        output: Bytes,
    },

    /// One encoded result row
    Data(Bytes),

    /// End of the rows of one statement
    CommandComplete { status: String },

    /// End of a request/response cycle
    ReadyForCommand { state: TransactionState },

    /// Structured server error
    Error(ServerError),

    /// Server-side log record
    Log {
        severity: u8,
        code: u32,
        text: String,
    },

    /// Server parameter announcement
    ParameterStatus { name: Bytes, value: Bytes },
}

impl Response {
    pub fn name(&self) -> &'static str {
        match self {
            Response::PrepareComplete { .. } => "PrepareComplete",
            Response::CommandDataDescription { .. } => "CommandDataDescription",
            Response::Data(_) => "Data",
            Response::CommandComplete { .. } => "CommandComplete",
            Response::ReadyForCommand { .. } => "ReadyForCommand",
            Response::Error(_) => "ErrorResponse",
            Response::Log { .. } => "LogMessage",
            Response::ParameterStatus { .. } => "ParameterStatus",
        }
    }
}

/// Slice `inner` (a sub-slice of `outer`'s memory) out of `outer` without copying.
fn sub_bytes(outer: &Bytes, inner: &[u8]) -> Bytes {
    let start = inner.as_ptr() as usize - outer.as_ptr() as usize;
    outer.slice(start..start + inner.len())
}

/// Decode one complete inbound message.
///
/// Unknown message types are a protocol violation; the connection cannot be
/// reused after one.
pub fn decode_message(msg: &RawMessage) -> DriverResult<Response> {
    let mtype = ServerMessage::try_from(msg.mtype)?;
    let mut r = msg.reader();

    let response = match mtype {
        ServerMessage::PrepareComplete => {
            r.skip_headers()?;
            let cardinality = Cardinality::try_from(r.pop_u8()?)?;
            Response::PrepareComplete {
                cardinality,
                input_id: r.pop_uuid()?,
                output_id: r.pop_uuid()?,
            }
        }
        ServerMessage::CommandDataDescription => {
            r.skip_headers()?;
            let cardinality = Cardinality::try_from(r.pop_u8()?)?;
            let input_id = r.pop_uuid()?;
            let input = sub_bytes(&msg.payload, r.pop_bytes()?);
            let output_id = r.pop_uuid()?;
            let output = sub_bytes(&msg.payload, r.pop_bytes()?);
            Response::CommandDataDescription {
                cardinality,
                input_id,
                input,
                output_id,
                output,
            }
        }
        ServerMessage::Data => {
            let count = r.pop_u16()?;
            if count != 1 {
                return Err(DriverError::ProtocolViolation(format!(
                    "expected one data element, got {}",
                    count
                )));
            }
            Response::Data(sub_bytes(&msg.payload, r.pop_bytes()?))
        }
        ServerMessage::CommandComplete => {
            r.skip_headers()?;
            Response::CommandComplete {
                status: r.pop_string()?,
            }
        }
        ServerMessage::ReadyForCommand => {
            r.skip_headers()?;
            Response::ReadyForCommand {
                state: TransactionState::try_from(r.pop_u8()?)?,
            }
        }
        ServerMessage::ErrorResponse => Response::Error(ServerError {
            severity: r.pop_u8()?,
            code: r.pop_u32()?,
            message: r.pop_string()?,
            attributes: r.pop_headers()?,
        }),
        ServerMessage::LogMessage => {
            let severity = r.pop_u8()?;
            let code = r.pop_u32()?;
            let text = r.pop_string()?;
            r.skip_headers()?;
            Response::Log {
                severity,
                code,
                text,
            }
        }
        ServerMessage::ParameterStatus => {
            let name = sub_bytes(&msg.payload, r.pop_bytes()?);
            let value = sub_bytes(&msg.payload, r.pop_bytes()?);
            Response::ParameterStatus { name, value }
        }
    };

    Ok(response)
}
