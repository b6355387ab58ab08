//! Binary protocol driver
//!
//! # Protocol Overview
//!
//! Every message, in both directions, is framed as
//! `[type: u8][length: u32 BE, including itself][payload]`. The client sends
//! one request message followed by `Sync`; the server replies with any number
//! of messages and ends the cycle with `ReadyForCommand`.
//!
//! - [`protocol`] holds the wire buffer and message codecs
//! - [`client`] runs the query flow on top of them

pub mod client;
pub mod protocol;

pub use client::{Connection, ConnectionBuilder, Destination, Query};
