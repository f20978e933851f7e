//! `HealthChecker` is the injected probe strategy. The HealthCheckTask
//! invokes it for every node it owns on each tick; the result is
//! counted, never propagated as an error.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::node::Node;

#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, node: &Node) -> bool;
}

/// Trivial "is TCP reachable" probe: open and immediately drop a
/// connection to the node's `connection_uri` host:port.
pub struct TcpConnectChecker {
    pub timeout: Duration,
}

impl TcpConnectChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpConnectChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl HealthChecker for TcpConnectChecker {
    async fn check(&self, node: &Node) -> bool {
        let host_port = match authority_of(&node.connection_uri) {
            Some(hp) => hp,
            None => {
                debug!(jvm_route = %node.jvm_route, uri = %node.connection_uri, "unparseable connection URI");
                return false;
            }
        };
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&host_port)).await,
            Ok(Ok(_))
        )
    }
}

/// HTTP CPING-style probe: GET a configurable health path relative to
/// the node's `connection_uri`; 2xx/3xx counts as success.
pub struct HttpPingChecker {
    client: reqwest::Client,
    pub path: String,
    pub timeout: Duration,
}

impl HttpPingChecker {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            path: path.into(),
            timeout,
        }
    }
}

impl Default for HttpPingChecker {
    fn default() -> Self {
        Self::new("/", Duration::from_secs(2))
    }
}

#[async_trait]
impl HealthChecker for HttpPingChecker {
    async fn check(&self, node: &Node) -> bool {
        let base = node.connection_uri.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        let url = format!("{base}/{path}");

        match self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success() || resp.status().is_redirection(),
            Err(e) => {
                debug!(jvm_route = %node.jvm_route, error = %e, "health probe request failed");
                false
            }
        }
    }
}

/// Parses a `scheme://host:port[/path]` connection URI and returns
/// `host:port`, suitable for `TcpStream::connect`. Falls back to a
/// default port per scheme when the URI omits one.
fn authority_of(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}
