use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use super::Connection;
use crate::cache::CodecCache;
use crate::config::ClientConfig;
use crate::error::DriverResult;

/// Builds connections that share one codec cache.
///
/// ```no_run
/// # async fn demo(stream: tokio::net::TcpStream) -> edgewire::DriverResult<()> {
/// let mut builder = edgewire::ConnectionBuilder::new().request_timeout_ms(5_000);
/// let mut conn = builder.build(stream)?;
/// let mut rows: Vec<i64> = Vec::new();
/// conn.query("select {1, 2, 3}", &edgewire::Value::Nothing, &mut rows).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionBuilder {
    config: ClientConfig,
    cache: Option<Arc<CodecCache>>,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            cache: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config_file(mut self, path: &Path) -> DriverResult<Self> {
        self.config = ClientConfig::from_file(path)?;
        Ok(self)
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = Some(ms);
        self
    }

    pub fn implicit_limit(mut self, limit: u64) -> Self {
        self.config.implicit_limit = Some(limit);
        self
    }

    /// Share an existing cache instead of creating one.
    pub fn cache(mut self, cache: Arc<CodecCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The cache given to every connection this builder creates.
    pub fn shared_cache(&mut self) -> Arc<CodecCache> {
        let size = self.config.codec_cache_size;
        self.cache
            .get_or_insert_with(|| Arc::new(CodecCache::new(size)))
            .clone()
    }

    /// Wrap an established stream.
    pub fn build<S>(&mut self, stream: S) -> DriverResult<Connection<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.config.validate()?;
        let cache = self.shared_cache();
        Ok(Connection::new(stream, self.config.clone(), cache))
    }
}
