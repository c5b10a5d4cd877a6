//! Gateway discovery and failover
//!
//! A [`GatewayLocator`] owns an ordered list of candidate endpoints and a soft
//! cache of the last one that answered its health probe. Probing is
//! sequential so the first healthy candidate in priority order always wins.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};

/// A candidate chat gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    base_url: String,
}

impl GatewayEndpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// Why a health probe did not succeed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("unhealthy status {0}")]
    Status(u16),

    #[error("unreachable: {0}")]
    Unreachable(String),
}

/// Liveness check strategy, injected so tests can fake endpoints.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, endpoint: &GatewayEndpoint) -> std::result::Result<(), ProbeFailure>;
}

/// `GET {base}/health` with a bounded timeout; any 2xx is live.
#[derive(Clone)]
pub struct HttpHealthProbe {
    client: Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, endpoint: &GatewayEndpoint) -> std::result::Result<(), ProbeFailure> {
        let response = self
            .client
            .get(endpoint.health_url())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeFailure::Timeout(self.timeout.as_millis() as u64)
                } else {
                    ProbeFailure::Unreachable(e.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProbeFailure::Status(response.status().as_u16()))
        }
    }
}

/// Finds a live gateway, preferring the cached one.
///
/// Shared between sessions behind an `Arc`. The cache is the only mutable
/// state and concurrent writers race (last write wins); a stale entry is
/// dropped on its next failed probe.
pub struct GatewayLocator {
    endpoints: Vec<GatewayEndpoint>,
    probe: Box<dyn HealthProbe>,
    cached: RwLock<Option<GatewayEndpoint>>,
}

impl GatewayLocator {
    pub fn new(endpoints: Vec<GatewayEndpoint>, probe: impl HealthProbe + 'static) -> Self {
        Self {
            endpoints,
            probe: Box::new(probe),
            cached: RwLock::new(None),
        }
    }

    pub fn endpoints(&self) -> &[GatewayEndpoint] {
        &self.endpoints
    }

    /// Last gateway that passed a probe, if any.
    pub fn cached(&self) -> Option<GatewayEndpoint> {
        self.cached.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn invalidate(&self) {
        self.store(None);
    }

    /// Return a live gateway or fail with [`ChatError::NoGatewayAvailable`].
    ///
    /// The cached gateway is probed first. If it fails, the scan resumes at
    /// the candidate after it and wraps around, skipping the failed one; the
    /// candidates ahead of it had already failed when it was cached. Without
    /// a cache the scan runs in configured order.
    pub async fn resolve(&self) -> Result<GatewayEndpoint> {
        let mut start = 0;
        let mut skip = None;

        if let Some(cached) = self.cached() {
            match self.probe.probe(&cached).await {
                Ok(()) => {
                    debug!(gateway = cached.base_url(), "cached gateway healthy");
                    return Ok(cached);
                }
                Err(failure) => {
                    warn!(gateway = cached.base_url(), %failure, "cached gateway failed probe");
                    self.store(None);
                    if let Some(idx) = self.endpoints.iter().position(|e| *e == cached) {
                        start = idx + 1;
                        skip = Some(idx);
                    }
                }
            }
        }

        let count = self.endpoints.len();
        for offset in 0..count {
            let idx = (start + offset) % count;
            if Some(idx) == skip {
                continue;
            }
            let endpoint = &self.endpoints[idx];
            match self.probe.probe(endpoint).await {
                Ok(()) => {
                    info!(gateway = endpoint.base_url(), "gateway selected");
                    self.store(Some(endpoint.clone()));
                    return Ok(endpoint.clone());
                }
                Err(failure) => {
                    debug!(gateway = endpoint.base_url(), %failure, "gateway probe failed");
                }
            }
        }

        warn!(candidates = count, "no chat gateway available");
        self.store(None);
        Err(ChatError::NoGatewayAvailable)
    }

    fn store(&self, endpoint: Option<GatewayEndpoint>) {
        // Poisoning cannot leave the Option half-written.
        let mut guard = self.cached.write().unwrap_or_else(|e| e.into_inner());
        *guard = endpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Probe answering from a mutable health table and recording every call.
    #[derive(Clone, Default)]
    struct ScriptedProbe {
        healthy: Arc<Mutex<HashMap<String, bool>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedProbe {
        fn set(&self, url: &str, healthy: bool) {
            self.healthy.lock().unwrap().insert(url.to_string(), healthy);
        }

        fn take_calls(&self) -> Vec<String> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, endpoint: &GatewayEndpoint) -> std::result::Result<(), ProbeFailure> {
            self.calls.lock().unwrap().push(endpoint.base_url().to_string());
            match self.healthy.lock().unwrap().get(endpoint.base_url()) {
                Some(true) => Ok(()),
                _ => Err(ProbeFailure::Status(503)),
            }
        }
    }

    fn locator(urls: &[&str], probe: &ScriptedProbe) -> GatewayLocator {
        GatewayLocator::new(
            urls.iter().map(|u| GatewayEndpoint::new(u)).collect(),
            probe.clone(),
        )
    }

    #[test]
    fn test_endpoint_urls() {
        let endpoint = GatewayEndpoint::new(" https://chat.example.com/ ");
        assert_eq!(endpoint.base_url(), "https://chat.example.com");
        assert_eq!(endpoint.health_url(), "https://chat.example.com/health");
        assert_eq!(
            endpoint.chat_completions_url(),
            "https://chat.example.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_first_healthy_candidate_wins() {
        let probe = ScriptedProbe::default();
        probe.set("http://b", true);
        probe.set("http://c", true);
        let locator = locator(&["http://a", "http://b", "http://c"], &probe);

        let endpoint = locator.resolve().await.unwrap();
        assert_eq!(endpoint.base_url(), "http://b");
        assert_eq!(probe.take_calls(), vec!["http://a", "http://b"]);
        assert_eq!(locator.cached(), Some(endpoint));
    }

    #[tokio::test]
    async fn test_cached_gateway_reused_without_scan() {
        let probe = ScriptedProbe::default();
        probe.set("http://b", true);
        let locator = locator(&["http://a", "http://b"], &probe);

        locator.resolve().await.unwrap();
        probe.take_calls();

        let endpoint = locator.resolve().await.unwrap();
        assert_eq!(endpoint.base_url(), "http://b");
        assert_eq!(probe.take_calls(), vec!["http://b"]);
    }

    #[tokio::test]
    async fn test_all_candidates_down() {
        let probe = ScriptedProbe::default();
        probe.set("http://a", true);
        let locator = locator(&["http://a", "http://b"], &probe);
        locator.resolve().await.unwrap();

        probe.set("http://a", false);
        probe.take_calls();

        let err = locator.resolve().await.unwrap_err();
        assert!(matches!(err, ChatError::NoGatewayAvailable));
        assert_eq!(probe.take_calls(), vec!["http://a", "http://b"]);
        assert_eq!(locator.cached(), None);
    }

    #[tokio::test]
    async fn test_failover_resumes_after_failed_cache() {
        let probe = ScriptedProbe::default();
        probe.set("http://y", true);
        probe.set("http://z", true);
        let locator = locator(&["http://x", "http://y", "http://z"], &probe);

        assert_eq!(locator.resolve().await.unwrap().base_url(), "http://y");
        assert_eq!(probe.take_calls(), vec!["http://x", "http://y"]);

        probe.set("http://y", false);
        assert_eq!(locator.resolve().await.unwrap().base_url(), "http://z");
        assert_eq!(probe.take_calls(), vec!["http://y", "http://z"]);
        assert_eq!(locator.cached().unwrap().base_url(), "http://z");
    }

    #[tokio::test]
    async fn test_failover_wraps_around() {
        let probe = ScriptedProbe::default();
        probe.set("http://z", true);
        let locator = locator(&["http://x", "http://y", "http://z"], &probe);
        locator.resolve().await.unwrap();

        probe.set("http://z", false);
        probe.set("http://x", true);
        probe.take_calls();

        assert_eq!(locator.resolve().await.unwrap().base_url(), "http://x");
        assert_eq!(probe.take_calls(), vec!["http://z", "http://x"]);
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let probe = ScriptedProbe::default();
        let locator = GatewayLocator::new(Vec::new(), probe);
        assert!(matches!(
            locator.resolve().await,
            Err(ChatError::NoGatewayAvailable)
        ));
    }

    #[tokio::test]
    async fn test_invalidate_forces_full_scan() {
        let probe = ScriptedProbe::default();
        probe.set("http://b", true);
        let locator = locator(&["http://a", "http://b"], &probe);
        locator.resolve().await.unwrap();
        locator.invalidate();
        probe.take_calls();

        locator.resolve().await.unwrap();
        assert_eq!(probe.take_calls(), vec!["http://a", "http://b"]);
    }

    #[tokio::test]
    async fn test_http_probe_against_local_listener() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for status in ["200 OK", "503 Service Unavailable"] {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        let client = Client::builder().no_proxy().build().unwrap();
        let probe = HttpHealthProbe::with_client(client, Duration::from_secs(3));
        let endpoint = GatewayEndpoint::new(&format!("http://{addr}"));
        assert_eq!(probe.probe(&endpoint).await, Ok(()));
        assert_eq!(probe.probe(&endpoint).await, Err(ProbeFailure::Status(503)));
    }
}
