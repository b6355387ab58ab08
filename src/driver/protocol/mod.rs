pub mod buffer;
pub mod command;
pub mod error;
pub mod message;
pub mod response;

pub use buffer::{frame_len, pop_message, RawMessage, Reader, Writer};
pub use command::{encode_command, Command};
pub use error::ServerError;
pub use message::{Cardinality, ClientMessage, Headers, IoFormat, ServerMessage, TransactionState};
pub use response::{decode_message, Response};

/// Default upper bound for a single inbound message (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
