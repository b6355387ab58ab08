//! Connection and query flow
//!
//! A [`Connection`] owns one transport stream and runs one request/response
//! cycle at a time. Each cycle is a client message followed by `Sync`; the
//! server answers with any number of messages terminated by
//! `ReadyForCommand`, and the connection always reads up to that point
//! before returning, even when the cycle failed.

mod builder;
mod flow;
mod query;
mod script;

pub use builder::ConnectionBuilder;
pub use query::{Destination, Query};

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use super::protocol::error::severity;
use super::protocol::{
    decode_message, encode_command, frame_len, pop_message, Command, Response, TransactionState,
};
use crate::cache::CodecCache;
use crate::config::ClientConfig;
use crate::error::{DriverError, DriverResult};

/// A single protocol connection.
pub struct Connection<S> {
    stream: S,
    read_buf: BytesMut,
    config: ClientConfig,
    cache: Arc<CodecCache>,
    state: TransactionState,
    /// Reason the connection became unusable, if it did
    broken: Option<String>,
    /// A request was sent and its `ReadyForCommand` has not been read yet
    in_flight: bool,
    server_params: BTreeMap<String, Bytes>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established, authenticated stream.
    pub fn new(stream: S, config: ClientConfig, cache: Arc<CodecCache>) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(config.read_buffer_capacity),
            config,
            cache,
            state: TransactionState::default(),
            broken: None,
            in_flight: false,
            server_params: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CodecCache> {
        &self.cache
    }

    /// Transaction state from the last `ReadyForCommand`.
    pub fn transaction_state(&self) -> TransactionState {
        self.state
    }

    /// False after a fatal error, or while the reply to a cancelled call
    /// is still unread.
    pub fn is_usable(&self) -> bool {
        self.broken.is_none() && !self.in_flight
    }

    /// Last value the server announced for a parameter.
    pub fn server_param(&self, name: &str) -> Option<&Bytes> {
        self.server_params.get(name)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Fails if a fatal error happened or if a previous call was dropped
    /// mid-cycle; the unread reply would otherwise be taken for the next one.
    fn check_usable(&mut self) -> DriverResult<()> {
        if self.in_flight && self.broken.is_none() {
            warn!("Connection marked unusable: previous request was cancelled");
            self.broken = Some("previous request was cancelled".to_string());
        }
        match &self.broken {
            Some(reason) => Err(DriverError::ConnectionUnusable(reason.clone())),
            None => Ok(()),
        }
    }

    /// Poison the connection after a fatal error.
    fn guard<T>(&mut self, result: DriverResult<T>) -> DriverResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() && self.broken.is_none() {
                warn!("Connection marked unusable: {}", err);
                self.broken = Some(err.to_string());
            }
        }
        result
    }

    async fn send(&mut self, cmd: &Command<'_>) -> DriverResult<()> {
        let data = encode_command(cmd);
        trace!(message = ?cmd.message_type(), len = data.len(), "send");
        self.in_flight = true;
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next complete message.
    async fn recv(&mut self) -> DriverResult<Response> {
        loop {
            if frame_len(&self.read_buf, self.config.max_message_size)?.is_some() {
                let msg = pop_message(&mut self.read_buf, self.config.max_message_size)?;
                let response = decode_message(&msg)?;
                trace!(message = response.name(), "recv");
                return Ok(response);
            }

            if self.read_buf.capacity() - self.read_buf.len() < 512 {
                self.read_buf.reserve(self.config.read_buffer_capacity);
            }
            let read = self.stream.read_buf(&mut self.read_buf);
            let n = match self.config.request_timeout_ms {
                Some(ms) => tokio::time::timeout(Duration::from_millis(ms), read)
                    .await
                    .map_err(|_| {
                        io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no response from server within {} ms", ms),
                        )
                    })??,
                None => read.await?,
            };
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )
                .into());
            }
        }
    }

    /// Read messages until `ReadyForCommand`, feeding the rest to `handle`.
    ///
    /// The first server error or non-fatal handler error is held back and
    /// returned once the cycle is drained; fatal errors return immediately.
    async fn drain<F>(&mut self, mut handle: F) -> DriverResult<()>
    where
        F: FnMut(Response) -> DriverResult<()>,
    {
        let mut pending: Option<DriverError> = None;
        loop {
            match self.recv().await? {
                Response::ReadyForCommand { state } => {
                    self.state = state;
                    self.in_flight = false;
                    break;
                }
                Response::Error(err) => {
                    debug!("Server error: {}", err);
                    if err.is_fatal() {
                        return Err(err.into());
                    }
                    pending.get_or_insert(err.into());
                }
                resp @ (Response::Log { .. } | Response::ParameterStatus { .. }) => {
                    self.fall_through(resp)
                }
                resp => {
                    if let Err(err) = handle(resp) {
                        if err.is_fatal() {
                            return Err(err);
                        }
                        pending.get_or_insert(err);
                    }
                }
            }
        }
        match pending {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Messages the server may send at any point of a cycle.
    fn fall_through(&mut self, resp: Response) {
        match resp {
            Response::Log {
                severity: level,
                code,
                text,
            } => {
                if level >= severity::WARNING {
                    warn!(code, "Server: {}", text);
                } else if level >= severity::INFO {
                    info!(code, "Server: {}", text);
                } else {
                    debug!(code, "Server: {}", text);
                }
            }
            Response::ParameterStatus { name, value } => {
                let name = String::from_utf8_lossy(&name).into_owned();
                debug!(name = %name, "Server parameter");
                self.server_params.insert(name, value);
            }
            _ => {}
        }
    }
}

pub(crate) fn unexpected(resp: &Response) -> DriverError {
    DriverError::ProtocolViolation(format!("unexpected {} message", resp.name()))
}
