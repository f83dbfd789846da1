//! HTTP/TCP implementation of the probe contracts

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::errors::OrchestratorError;
use crate::models::analysis::ComponentKind;
use crate::orchestrator::plan::DEFAULT_API_HEALTH_PATH;
use crate::probe::{HealthProber, HealthStatus, HttpReply, JourneyClient};

const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Probes frontends and APIs over HTTP and databases by TCP reachability
pub struct HttpProbeClient {
    client: Client,
    timeout: Duration,
}

impl HttpProbeClient {
    /// Create a new probe client
    pub fn new(timeout: Duration) -> Result<Self, OrchestratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("codeflowd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            timeout,
        })
    }

    async fn check_http(&self, url: &str) -> HealthStatus {
        let start = Instant::now();
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let latency = start.elapsed();
                if status.is_success() || status.is_redirection() {
                    HealthStatus::healthy(latency).with_status_code(status.as_u16())
                } else {
                    HealthStatus::unhealthy(format!("{} returned {}", url, status))
                        .with_status_code(status.as_u16())
                }
            }
            Err(e) => HealthStatus::unhealthy(format!("{} unreachable: {}", url, e)),
        }
    }

    async fn check_api(&self, endpoint: &str, health_path: &str) -> HealthStatus {
        let status = self.check_http(&join_url(endpoint, health_path)).await;
        if status.status_code == Some(404) {
            // No health route; fall back to the API root
            debug!("No health route on {}, probing root", endpoint);
            return self.check_http(endpoint).await;
        }
        status
    }

    async fn check_tcp(&self, endpoint: &str) -> HealthStatus {
        let address = match socket_address(endpoint) {
            Ok(address) => address,
            Err(e) => return HealthStatus::unhealthy(e.to_string()),
        };

        let start = Instant::now();
        match tokio::time::timeout(self.timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_)) => HealthStatus::healthy(start.elapsed()),
            Ok(Err(e)) => HealthStatus::unhealthy(format!("{} unreachable: {}", address, e)),
            Err(_) => HealthStatus::unhealthy(format!(
                "{} did not accept a connection within {:?}",
                address, self.timeout
            )),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<HttpReply, OrchestratorError> {
        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpReply {
            status,
            body,
            latency: start.elapsed(),
        })
    }
}

#[async_trait]
impl HealthProber for HttpProbeClient {
    async fn check(&self, endpoint: &str, kind: ComponentKind) -> HealthStatus {
        self.check_route(endpoint, kind, None).await
    }

    async fn check_route(
        &self,
        endpoint: &str,
        kind: ComponentKind,
        health_path: Option<&str>,
    ) -> HealthStatus {
        debug!("Health check {} at {} ({:?})", kind, endpoint, health_path);
        match kind {
            ComponentKind::Frontend => {
                self.check_http(&join_url(endpoint, health_path.unwrap_or("")))
                    .await
            }
            ComponentKind::Api => {
                self.check_api(endpoint, health_path.unwrap_or(DEFAULT_API_HEALTH_PATH))
                    .await
            }
            ComponentKind::Database => self.check_tcp(endpoint).await,
        }
    }
}

#[async_trait]
impl JourneyClient for HttpProbeClient {
    async fn get(&self, url: &str) -> Result<HttpReply, OrchestratorError> {
        debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, OrchestratorError> {
        debug!("POST {}", url);
        self.send(self.client.post(url).json(body)).await
    }

    async fn delete(&self, url: &str) -> Result<HttpReply, OrchestratorError> {
        debug!("DELETE {}", url);
        self.send(self.client.delete(url)).await
    }

    /// Reachability of the database listener; engine-level read/write probes
    /// belong to provider-specific clients.
    async fn database_round_trip(&self, endpoint: &str) -> Result<bool, OrchestratorError> {
        Ok(self.check_tcp(endpoint).await.healthy)
    }
}

/// Join a base URL and a path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// `host:port` of a database endpoint such as `postgres://db:5432/app` or `db:5432`
pub fn socket_address(endpoint: &str) -> Result<String, OrchestratorError> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("tcp://{}", endpoint)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| OrchestratorError::ConfigError(format!("Invalid endpoint {}: {}", endpoint, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| OrchestratorError::ConfigError(format!("Endpoint {} has no host", endpoint)))?;

    Ok(format!("{}:{}", host, url.port().unwrap_or(DEFAULT_DATABASE_PORT)))
}
