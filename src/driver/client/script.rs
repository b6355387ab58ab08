use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{unexpected, Connection};
use crate::driver::protocol::{Command, Response};
use crate::error::DriverResult;

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run one or more statements that take no arguments, discarding results.
    pub async fn execute(&mut self, script: &str) -> DriverResult<()> {
        self.check_usable()?;
        let headers = self.config.headers();
        let result = self.execute_script(&headers, script).await;
        self.guard(result)
    }

    async fn execute_script(
        &mut self,
        headers: &crate::driver::protocol::Headers,
        script: &str,
    ) -> DriverResult<()> {
        self.send(&Command::ExecuteScript { headers, script }).await?;
        self.drain(|resp| match resp {
            Response::CommandComplete { status } => {
                debug!(status = %status, "Script complete");
                Ok(())
            }
            other => Err(unexpected(&other)),
        })
        .await
    }
}
