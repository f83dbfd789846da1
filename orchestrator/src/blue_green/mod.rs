//! Blue/green deployment on top of the stack orchestrator
//!
//! Green is deployed while blue keeps serving. Traffic then moves to green in
//! stages while green is sampled; a threshold breach, a failed sample or a
//! routing error sends all traffic back to blue. The whole shift is bounded by
//! `rollback_threshold`: a shift still running when it elapses is rolled back.

pub mod traffic;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::errors::OrchestratorError;
use crate::models::analysis::RepoAnalysis;
use crate::models::blue_green::{
    BlueGreenDeployment, BlueGreenStatus, TrafficSample, TrafficShiftStrategy, TrafficSplit,
};
use crate::models::result::FullStackDeployment;
use crate::models::state::StateMutation;
use crate::orchestrator::StackOrchestrator;

pub use traffic::{InMemoryRouter, ProbeTrafficMonitor, TrafficMonitor, TrafficRouter};

const BOOKKEEPING_KEY: &str = "blue_green";

/// Blue/green settings
#[derive(Debug, Clone)]
pub struct BlueGreenConfig {
    pub strategy: TrafficShiftStrategy,

    /// Highest tolerated green error rate, 0.0 to 1.0
    pub max_error_rate: f64,

    /// Highest tolerated green response time
    pub max_response_time: Duration,

    /// Upper bound for the whole traffic shift
    pub rollback_threshold: Duration,

    /// Interval between green samples
    pub sample_interval: Duration,

    /// Refuse to shift unless green passed end-to-end validation
    pub require_e2e_validation: bool,

    /// Tear green down when traffic goes back to blue
    pub teardown_green_on_rollback: bool,
}

impl Default for BlueGreenConfig {
    fn default() -> Self {
        Self {
            strategy: TrafficShiftStrategy::default(),
            max_error_rate: 0.05,
            max_response_time: Duration::from_millis(2000),
            rollback_threshold: Duration::from_secs(10 * 60),
            sample_interval: Duration::from_secs(60),
            require_e2e_validation: true,
            teardown_green_on_rollback: true,
        }
    }
}

impl BlueGreenConfig {
    /// Traffic percentages and how long each is held
    pub fn stages(&self) -> Vec<(u8, Duration)> {
        match &self.strategy {
            TrafficShiftStrategy::Immediate => vec![(100, self.sample_interval)],
            TrafficShiftStrategy::Gradual {
                step_percent,
                step_interval,
            } => {
                let step = (*step_percent).clamp(1, 100);
                let mut stages = Vec::new();
                let mut percent = 0u8;
                while percent < 100 {
                    percent = percent.saturating_add(step).min(100);
                    stages.push((percent, *step_interval));
                }
                stages
            }
            TrafficShiftStrategy::Canary {
                percent,
                observation,
            } => {
                if *percent >= 100 {
                    vec![(100, *observation)]
                } else {
                    vec![((*percent).max(1), *observation), (100, self.sample_interval)]
                }
            }
        }
    }

    /// Breach description when `sample` exceeds a threshold
    pub fn breach(&self, sample: &TrafficSample) -> Option<String> {
        if sample.error_rate > self.max_error_rate {
            return Some(format!(
                "error rate {:.1}% above {:.1}% at {}% traffic",
                sample.error_rate * 100.0,
                self.max_error_rate * 100.0,
                sample.green_percent
            ));
        }
        let ceiling = self.max_response_time.as_millis() as u64;
        if sample.response_time_ms > ceiling {
            return Some(format!(
                "response time {} ms above {} ms at {}% traffic",
                sample.response_time_ms, ceiling, sample.green_percent
            ));
        }
        None
    }
}

pub struct BlueGreenOrchestrator {
    stack: Arc<StackOrchestrator>,
    router: Arc<dyn TrafficRouter>,
    monitor: Arc<dyn TrafficMonitor>,
    config: BlueGreenConfig,
}

impl BlueGreenOrchestrator {
    pub fn new(
        stack: Arc<StackOrchestrator>,
        router: Arc<dyn TrafficRouter>,
        monitor: Arc<dyn TrafficMonitor>,
        config: BlueGreenConfig,
    ) -> Self {
        Self {
            stack,
            router,
            monitor,
            config,
        }
    }

    pub fn config(&self) -> &BlueGreenConfig {
        &self.config
    }

    /// Deploy green next to `blue_deployment_id` and move traffic to it
    pub async fn deploy(
        &self,
        analysis: &RepoAnalysis,
        blue_deployment_id: Option<String>,
    ) -> BlueGreenDeployment {
        let green = self.stack.deploy_full_stack_application(analysis).await;
        let green_id = green.deployment_id.clone();
        let mut outcome = BlueGreenDeployment {
            blue_deployment_id: blue_deployment_id.clone(),
            strategy: self.config.strategy.name().to_string(),
            status: BlueGreenStatus::Shifting,
            final_split: TrafficSplit::all_blue(blue_deployment_id.clone(), &green_id),
            rollback_performed: false,
            rollback_reason: None,
            samples: Vec::new(),
            green,
        };

        if let Some(reason) = self.not_ready(&outcome.green) {
            warn!(green = %green_id, "Green not eligible for traffic: {}", reason);
            if outcome.green.success {
                // Deployed but unvalidated; failed deployments were already rolled back
                if let Err(e) = self.stack.rollback(&green_id, None).await {
                    warn!(green = %green_id, "Teardown of green failed: {}", e);
                }
            }
            outcome.status = BlueGreenStatus::Failed;
            outcome.rollback_reason = Some(reason);
            self.record(&outcome).await;
            return outcome;
        }

        info!(
            green = %green_id,
            blue = ?blue_deployment_id,
            strategy = %outcome.strategy,
            "Starting traffic shift"
        );
        self.record(&outcome).await;

        let started = Instant::now();
        let mut samples = Vec::new();
        let mut split = outcome.final_split.clone();
        let shifted = tokio::time::timeout(
            self.config.rollback_threshold,
            self.shift(&outcome.green, &mut split, &mut samples),
        )
        .await;
        outcome.samples = samples;

        let failure = match shifted {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "traffic shift did not complete within {:?}",
                self.config.rollback_threshold
            )),
        };

        match failure {
            None => {
                info!(
                    green = %green_id,
                    "Traffic shift completed in {:?}; blue retired",
                    started.elapsed()
                );
                outcome.status = BlueGreenStatus::Completed;
                outcome.final_split = split;
            }
            Some(reason) => {
                warn!(green = %green_id, "Rolling back to blue: {}", reason);
                match self.route_to_blue(&split).await {
                    Ok(blue) => {
                        outcome.final_split = blue;
                        self.teardown_green(&green_id).await;
                        outcome.status = BlueGreenStatus::RolledBack;
                        outcome.rollback_performed = true;
                        outcome.rollback_reason = Some(reason);
                    }
                    Err(e) => {
                        // Green keeps its share and stays up until a manual rollback
                        outcome.final_split = split;
                        outcome.status = BlueGreenStatus::RollbackFailed;
                        outcome.rollback_reason = Some(format!("{}; {}", reason, e));
                    }
                }
            }
        }

        self.record(&outcome).await;
        outcome
    }

    fn not_ready(&self, green: &FullStackDeployment) -> Option<String> {
        if !green.success {
            return Some(
                green
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "green deployment failed".to_string()),
            );
        }
        if self.config.require_e2e_validation
            && !green.e2e_test_result.as_ref().is_some_and(|r| r.success)
        {
            return Some("green has no successful end-to-end validation".to_string());
        }
        None
    }

    async fn shift(
        &self,
        green: &FullStackDeployment,
        split: &mut TrafficSplit,
        samples: &mut Vec<TrafficSample>,
    ) -> Result<(), OrchestratorError> {
        for (percent, hold) in self.config.stages() {
            split.green_percent = percent;
            self.router.route(split).await?;
            self.record_split(green, split).await;

            let interval = if self.config.sample_interval.is_zero() {
                hold
            } else {
                self.config.sample_interval
            };
            let stage_start = Instant::now();
            loop {
                let remaining = hold.saturating_sub(stage_start.elapsed());
                tokio::time::sleep(interval.min(remaining)).await;

                let sample = self.monitor.sample(green, percent).await.map_err(|e| {
                    OrchestratorError::TrafficShiftBreach(format!("green could not be sampled: {}", e))
                })?;
                let breach = self.config.breach(&sample);
                samples.push(sample);
                if let Some(breach) = breach {
                    return Err(OrchestratorError::TrafficShiftBreach(breach));
                }
                if stage_start.elapsed() >= hold {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Route everything to blue; returns the split in force afterwards
    async fn route_to_blue(&self, split: &TrafficSplit) -> Result<TrafficSplit, OrchestratorError> {
        let blue = TrafficSplit::all_blue(
            split.blue_deployment_id.clone(),
            split.green_deployment_id.clone(),
        );
        if let Err(e) = self.router.route(&blue).await {
            error!(
                green = %split.green_deployment_id,
                green_percent = split.green_percent,
                "Failed to route traffic back to blue: {}",
                e
            );
            return Err(OrchestratorError::RoutingError(format!(
                "traffic could not be routed back to blue: {}",
                e
            )));
        }
        Ok(blue)
    }

    async fn teardown_green(&self, green_id: &str) {
        if !self.config.teardown_green_on_rollback {
            return;
        }
        match self.stack.rollback(green_id, None).await {
            Ok(report) => info!(green = %green_id, "Green torn down: {}", report.summary()),
            Err(e) => warn!(green = %green_id, "Teardown of green failed: {}", e),
        }
    }

    /// Manually send traffic back to blue; safe to repeat.
    ///
    /// Returns `Ok(false)` when traffic is already back on blue. A failed
    /// route leaves the record retryable and returns `RoutingError`.
    pub async fn rollback_deployment(
        &self,
        green_deployment_id: &str,
    ) -> Result<bool, OrchestratorError> {
        let state = self.stack.store().get(green_deployment_id).await?;
        let bookkeeping = state.metadata.get(BOOKKEEPING_KEY).ok_or_else(|| {
            OrchestratorError::NotFound(format!(
                "blue/green record of deployment {}",
                green_deployment_id
            ))
        })?;

        if bookkeeping.get("status").and_then(|s| s.as_str())
            == Some(BlueGreenStatus::RolledBack.as_str())
        {
            info!(green = %green_deployment_id, "Already rolled back to blue");
            return Ok(false);
        }

        let blue = bookkeeping
            .get("blue_deployment_id")
            .and_then(|b| b.as_str())
            .map(str::to_string);
        let split = TrafficSplit::all_blue(blue.clone(), green_deployment_id);
        if let Err(e) = self.route_to_blue(&split).await {
            let mut entry = bookkeeping.clone();
            if let Some(fields) = entry.as_object_mut() {
                fields.insert("status".to_string(), json!(BlueGreenStatus::RollbackFailed));
                fields.insert("rollback_reason".to_string(), json!(e.to_string()));
                fields.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
            }
            if let Err(w) = self.write_bookkeeping(green_deployment_id, entry).await {
                warn!(green = %green_deployment_id, "Failed to record blue/green state: {}", w);
            }
            return Err(e);
        }
        self.teardown_green(green_deployment_id).await;

        let mut entry = bookkeeping.clone();
        if let Some(fields) = entry.as_object_mut() {
            fields.insert("status".to_string(), json!(BlueGreenStatus::RolledBack));
            fields.insert("green_percent".to_string(), json!(0));
            fields.insert("rollback_reason".to_string(), json!("manual rollback"));
            fields.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        }
        self.write_bookkeeping(green_deployment_id, entry).await?;

        info!(green = %green_deployment_id, blue = ?blue, "Rolled back to blue");
        Ok(true)
    }

    async fn record(&self, outcome: &BlueGreenDeployment) {
        let entry = json!({
            "blue_deployment_id": outcome.blue_deployment_id,
            "strategy": outcome.strategy,
            "status": outcome.status,
            "green_percent": outcome.final_split.green_percent,
            "rollback_performed": outcome.rollback_performed,
            "rollback_reason": outcome.rollback_reason,
            "samples": outcome.samples.len(),
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Err(e) = self
            .write_bookkeeping(&outcome.green.deployment_id, entry)
            .await
        {
            warn!(
                green = %outcome.green.deployment_id,
                "Failed to record blue/green state: {}",
                e
            );
        }
    }

    async fn record_split(&self, green: &FullStackDeployment, split: &TrafficSplit) {
        let entry = json!({
            "blue_deployment_id": split.blue_deployment_id,
            "strategy": self.config.strategy.name(),
            "status": BlueGreenStatus::Shifting,
            "green_percent": split.green_percent,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Err(e) = self.write_bookkeeping(&green.deployment_id, entry).await {
            warn!(green = %green.deployment_id, "Failed to record traffic split: {}", e);
        }
    }

    async fn write_bookkeeping(
        &self,
        green_deployment_id: &str,
        entry: serde_json::Value,
    ) -> Result<(), OrchestratorError> {
        let store = self.stack.store();
        let current = store.get(green_deployment_id).await?;
        store
            .update(
                green_deployment_id,
                current.version,
                StateMutation::new().meta(BOOKKEEPING_KEY, entry),
            )
            .await?;
        Ok(())
    }
}
