use bytes::Bytes;
use uuid::Uuid;

use super::buffer::Writer;
use super::message::{Cardinality, ClientMessage, Headers, IoFormat, ASPECT_DATA_DESCRIPTION};

/// Requests the query flow can send.
#[derive(Debug, Clone)]
pub enum Command<'a> {
    /// Compile a query and ask for its descriptor IDs
    Prepare {
        headers: &'a Headers,
        format: IoFormat,
        cardinality: Cardinality,
        command: &'a str,
    },

    /// Ask for the full descriptors of the unnamed prepared statement
    DescribeStatement { headers: &'a Headers },

    /// Run the unnamed prepared statement
    Execute {
        headers: &'a Headers,
        arguments: &'a [u8],
    },

    /// Compile, check the caller's type IDs and run in one round trip
    OptimisticExecute {
        headers: &'a Headers,
        format: IoFormat,
        cardinality: Cardinality,
        command: &'a str,
        input_id: Uuid,
        output_id: Uuid,
        arguments: &'a [u8],
    },

    /// Run a script without arguments or results
    ExecuteScript { headers: &'a Headers, script: &'a str },
}

impl Command<'_> {
    pub fn message_type(&self) -> ClientMessage {
        match self {
            Command::Prepare { .. } => ClientMessage::Prepare,
            Command::DescribeStatement { .. } => ClientMessage::DescribeStatement,
            Command::Execute { .. } => ClientMessage::Execute,
            Command::OptimisticExecute { .. } => ClientMessage::OptimisticExecute,
            Command::ExecuteScript { .. } => ClientMessage::ExecuteScript,
        }
    }
}

/// Encode a request followed by `Sync` as one batch.
pub fn encode_command(cmd: &Command<'_>) -> Bytes {
    let mut w = Writer::new();
    w.begin_message(cmd.message_type());

    match cmd {
        Command::Prepare {
            headers,
            format,
            cardinality,
            command,
        } => {
            w.push_headers(headers);
            w.push_u8(*format as u8);
            w.push_u8(*cardinality as u8);
            w.push_bytes(&[]); // statement name
            w.push_string(command);
        }
        Command::DescribeStatement { headers } => {
            w.push_headers(headers);
            w.push_u8(ASPECT_DATA_DESCRIPTION);
            w.push_bytes(&[]);
        }
        Command::Execute { headers, arguments } => {
            w.push_headers(headers);
            w.push_bytes(&[]);
            w.push_bytes(arguments);
        }
        Command::OptimisticExecute {
            headers,
            format,
            cardinality,
            command,
            input_id,
            output_id,
            arguments,
        } => {
            w.push_headers(headers);
            w.push_u8(*format as u8);
            w.push_u8(*cardinality as u8);
            w.push_string(command);
            w.push_uuid(input_id);
            w.push_uuid(output_id);
            w.push_bytes(arguments);
        }
        Command::ExecuteScript { headers, script } => {
            w.push_headers(headers);
            w.push_string(script);
        }
    }

    w.end_message();
    w.push_sync();
    w.into_bytes()
}
