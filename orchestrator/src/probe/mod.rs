//! Health probing and end-to-end request contracts

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::OrchestratorError;
use crate::models::analysis::ComponentKind;

pub use self::http::HttpProbeClient;

/// Result of a single health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            healthy: true,
            error: None,
            status_code: None,
            latency_ms: latency.as_millis() as u64,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            error: Some(error.into()),
            status_code: None,
            latency_ms: 0,
            checked_at: Utc::now(),
        }
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Checks whether a deployed component is serving
#[async_trait]
pub trait HealthProber: Send + Sync {
    async fn check(&self, endpoint: &str, kind: ComponentKind) -> HealthStatus;

    /// Check under the component's configured health route. Probers without
    /// route support ignore `health_path`.
    async fn check_route(
        &self,
        endpoint: &str,
        kind: ComponentKind,
        _health_path: Option<&str>,
    ) -> HealthStatus {
        self.check(endpoint, kind).await
    }
}

/// Reply to a journey request
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: ::http::StatusCode,
    pub body: String,
    pub latency: Duration,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: ::http::StatusCode::from_u16(status)
                .unwrap_or(::http::StatusCode::INTERNAL_SERVER_ERROR),
            body: body.into(),
            latency: Duration::ZERO,
        }
    }

    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }
}

/// Requests issued by the end-to-end user journey
#[async_trait]
pub trait JourneyClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpReply, OrchestratorError>;

    async fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, OrchestratorError>;

    async fn delete(&self, url: &str) -> Result<HttpReply, OrchestratorError>;

    /// Logical write-then-read against a database endpoint
    async fn database_round_trip(&self, endpoint: &str) -> Result<bool, OrchestratorError>;
}
