//! Client driver core for a typed, binary query protocol.
//!
//! The server describes the argument and result types of each statement with
//! type descriptors. This crate parses them, builds codecs between the wire
//! format and Rust destination types, caches both, and runs queries with as
//! few round trips as the caches allow.

pub mod cache;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;

pub use cache::{CacheStats, CodecCache};
pub use codec::{Queryable, Value};
pub use config::ClientConfig;
pub use driver::{Connection, ConnectionBuilder, Destination, Query};
pub use error::{DriverError, DriverResult, ErrorKind};
