use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{PushTransport, TransportLink};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{Identity, JoinMessage, PushFrame};

/// Push channel over TCP carrying newline-delimited JSON frames.
///
/// The first line we send is the join message; every line we receive is a
/// `PushFrame`. Lost connections are retried every `reconnect_delay`.
#[derive(Debug, Clone)]
pub struct LineTransport {
    addr: String,
    reconnect_delay: Duration,
}

impl LineTransport {
    pub fn new(addr: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            addr: addr.into(),
            reconnect_delay,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.push_addr.clone(), config.reconnect_delay())
    }

    /// Connect and send the join line.
    async fn handshake(addr: &str, identity: &Identity) -> SyncResult<TcpStream> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SyncError::connection(format!("connect to {}: {}", addr, e)))?;

        let join = JoinMessage::Join {
            identity: identity.clone(),
        };
        let mut line = serde_json::to_string(&join)?;
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SyncError::connection(format!("join on {}: {}", addr, e)))?;
        Ok(stream)
    }

    /// Keep the link alive until the receiving side goes away.
    async fn run(
        addr: String,
        identity: Identity,
        link: TransportLink,
        reconnect_delay: Duration,
        mut stream: TcpStream,
    ) {
        loop {
            match Self::read_stream(stream, &link).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("inbound receiver dropped, stopping push transport");
                    return;
                }
                Err(e) => warn!(addr = %addr, "push stream read error: {}", e),
            }
            link.status.send_replace(false);
            warn!(addr = %addr, "push channel disconnected");

            let mut attempt: u64 = 0;
            stream = loop {
                tokio::time::sleep(reconnect_delay).await;
                if link.inbound.is_closed() {
                    return;
                }
                attempt += 1;
                match Self::handshake(&addr, &identity).await {
                    Ok(stream) => break stream,
                    Err(e) => debug!(attempt, "reconnect failed: {}", e),
                }
            };
            link.status.send_replace(true);
            info!(addr = %addr, attempt, "push channel reconnected and rejoined");
        }
    }

    /// Returns Ok(true) on EOF, Ok(false) when nobody listens anymore.
    async fn read_stream(stream: TcpStream, link: &TransportLink) -> Result<bool, std::io::Error> {
        let mut lines = BufReader::new(stream).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<PushFrame>(&line) {
                Ok(frame) => {
                    if link.inbound.send(frame).await.is_err() {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    debug!("failed to parse frame: {} - line: {}", e, line);
                }
            }
        }
        Ok(true)
    }
}

impl PushTransport for LineTransport {
    fn open(
        &self,
        identity: Identity,
        link: TransportLink,
    ) -> BoxFuture<'_, SyncResult<Option<AbortHandle>>> {
        Box::pin(async move {
            let stream = Self::handshake(&self.addr, &identity).await?;
            link.status.send_replace(true);
            info!(addr = %self.addr, identity = %identity, "push channel connected");

            let task = tokio::spawn(Self::run(
                self.addr.clone(),
                identity,
                link,
                self.reconnect_delay,
                stream,
            ));
            Ok(Some(task.abort_handle()))
        })
    }
}
