//! Traffic routing and sampling contracts

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::OrchestratorError;
use crate::models::analysis::ComponentKind;
use crate::models::blue_green::{TrafficSample, TrafficSplit};
use crate::models::result::FullStackDeployment;
use crate::probe::HealthProber;

/// Moves live traffic between blue and green
#[async_trait]
pub trait TrafficRouter: Send + Sync {
    async fn route(&self, split: &TrafficSplit) -> Result<(), OrchestratorError>;
}

/// Measures green while it takes traffic
#[async_trait]
pub trait TrafficMonitor: Send + Sync {
    async fn sample(
        &self,
        green: &FullStackDeployment,
        green_percent: u8,
    ) -> Result<TrafficSample, OrchestratorError>;
}

/// Router that keeps the applied splits in memory
#[derive(Default)]
pub struct InMemoryRouter {
    history: RwLock<Vec<TrafficSplit>>,
}

impl InMemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied split
    pub fn current(&self) -> Option<TrafficSplit> {
        let history = self.history.read().unwrap_or_else(|e| e.into_inner());
        history.last().cloned()
    }

    /// Every applied split, oldest first
    pub fn history(&self) -> Vec<TrafficSplit> {
        let history = self.history.read().unwrap_or_else(|e| e.into_inner());
        history.clone()
    }
}

#[async_trait]
impl TrafficRouter for InMemoryRouter {
    async fn route(&self, split: &TrafficSplit) -> Result<(), OrchestratorError> {
        info!(
            green = %split.green_deployment_id,
            "Routing {}% to green, {}% to blue",
            split.green_percent,
            split.blue_percent()
        );
        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        history.push(split.clone());
        Ok(())
    }
}

/// Samples green by probing its primary endpoint a fixed number of times
pub struct ProbeTrafficMonitor {
    prober: Arc<dyn HealthProber>,
    probes: u32,
}

impl ProbeTrafficMonitor {
    pub fn new(prober: Arc<dyn HealthProber>, probes: u32) -> Self {
        Self {
            prober,
            probes: probes.max(1),
        }
    }
}

#[async_trait]
impl TrafficMonitor for ProbeTrafficMonitor {
    async fn sample(
        &self,
        green: &FullStackDeployment,
        green_percent: u8,
    ) -> Result<TrafficSample, OrchestratorError> {
        let (endpoint, kind) = match (&green.frontend_url, &green.api_endpoint) {
            (Some(url), _) => (url.as_str(), ComponentKind::Frontend),
            (None, Some(api)) => (api.as_str(), ComponentKind::Api),
            (None, None) => {
                return Err(OrchestratorError::NotFound(format!(
                    "traffic endpoint of deployment {}",
                    green.deployment_id
                )))
            }
        };

        let mut failures = 0u32;
        let mut total_latency_ms = 0u64;
        for _ in 0..self.probes {
            let status = self.prober.check(endpoint, kind).await;
            if !status.healthy {
                failures += 1;
            }
            total_latency_ms += status.latency_ms;
        }

        let mut sample = TrafficSample::new(
            f64::from(failures) / f64::from(self.probes),
            std::time::Duration::from_millis(total_latency_ms / u64::from(self.probes)),
        );
        sample.green_percent = green_percent;
        debug!(
            "Sampled {}: error rate {:.3}, {} ms",
            endpoint, sample.error_rate, sample.response_time_ms
        );
        Ok(sample)
    }
}
