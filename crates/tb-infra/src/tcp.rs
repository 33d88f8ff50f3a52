use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::PortProber;

/// TCP connect probe with a per-attempt timeout.
pub struct TcpPortProber {
    connect_timeout: Duration,
}

impl TcpPortProber {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpPortProber {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl PortProber for TcpPortProber {
    async fn probe(&self, host: &str, port: u16) -> bool {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            // The stream is dropped right away; only reachability matters.
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::trace!(host, port, error = %e, "tcp probe refused");
                false
            }
            Err(_) => {
                tracing::trace!(host, port, "tcp probe timed out");
                false
            }
        }
    }
}
