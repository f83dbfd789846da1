//! Blue/green traffic shifting tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use codeflow_orchestrator::blue_green::{
    BlueGreenConfig, BlueGreenOrchestrator, InMemoryRouter, TrafficMonitor, TrafficRouter,
};
use codeflow_orchestrator::errors::OrchestratorError;
use codeflow_orchestrator::models::analysis::ComponentKind;
use codeflow_orchestrator::models::blue_green::{
    BlueGreenStatus, TrafficSample, TrafficShiftStrategy, TrafficSplit,
};
use codeflow_orchestrator::models::result::FullStackDeployment;
use codeflow_orchestrator::store::StateStore;

use crate::common::{full_stack_analysis, harness, Harness, HarnessBuilder};

/// Replays scripted error rates, then reports a clean green
#[derive(Default)]
struct ScriptedMonitor {
    error_rates: Mutex<VecDeque<f64>>,
}

impl ScriptedMonitor {
    fn with_rates(rates: &[f64]) -> Self {
        Self {
            error_rates: Mutex::new(rates.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl TrafficMonitor for ScriptedMonitor {
    async fn sample(
        &self,
        _green: &FullStackDeployment,
        green_percent: u8,
    ) -> Result<TrafficSample, OrchestratorError> {
        let rate = self.error_rates.lock().unwrap().pop_front().unwrap_or(0.0);
        let mut sample = TrafficSample::new(rate, Duration::from_millis(120));
        sample.green_percent = green_percent;
        Ok(sample)
    }
}

/// Rejects the first attempt to send all traffic back to blue
struct StuckRouter {
    inner: InMemoryRouter,
    stuck: AtomicBool,
}

impl StuckRouter {
    fn new() -> Self {
        Self {
            inner: InMemoryRouter::new(),
            stuck: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl TrafficRouter for StuckRouter {
    async fn route(&self, split: &TrafficSplit) -> Result<(), OrchestratorError> {
        if split.green_percent == 0 && self.stuck.swap(false, Ordering::SeqCst) {
            return Err(OrchestratorError::RoutingError(
                "load balancer rejected the update".to_string(),
            ));
        }
        self.inner.route(split).await
    }
}

fn blue_green<R: TrafficRouter + 'static>(
    h: &Harness,
    router: &Arc<R>,
    monitor: ScriptedMonitor,
    strategy: TrafficShiftStrategy,
) -> BlueGreenOrchestrator {
    BlueGreenOrchestrator::new(
        h.orchestrator.clone(),
        router.clone(),
        Arc::new(monitor),
        BlueGreenConfig {
            strategy,
            sample_interval: Duration::from_secs(60),
            ..Default::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_error_rate_breach_rolls_back_to_blue() {
    let h = harness();
    let router = Arc::new(InMemoryRouter::new());
    let orchestrator = blue_green(
        &h,
        &router,
        ScriptedMonitor::with_rates(&[0.01, 0.12]),
        TrafficShiftStrategy::Gradual {
            step_percent: 25,
            step_interval: Duration::from_secs(60),
        },
    );

    let outcome = orchestrator
        .deploy(&full_stack_analysis(), Some("blue-1".to_string()))
        .await;

    assert_eq!(outcome.status, BlueGreenStatus::RolledBack);
    assert!(outcome.rollback_performed);
    assert!(outcome.rollback_reason.as_deref().unwrap().contains("error rate"));
    assert_eq!(outcome.samples.len(), 2);
    assert_eq!(outcome.final_split.green_percent, 0);

    let applied: Vec<u8> = router.history().iter().map(|s| s.green_percent).collect();
    assert_eq!(applied, vec![25, 50, 0]);
    assert_eq!(
        router.current().unwrap().blue_deployment_id.as_deref(),
        Some("blue-1")
    );

    // Green is gone
    assert_eq!(h.database.teardown_count(), 1);
    assert_eq!(h.api.teardown_count(), 1);
    assert_eq!(h.frontend.teardown_count(), 1);

    let state = h.store.get(&outcome.green.deployment_id).await.unwrap();
    assert_eq!(state.metadata["blue_green"]["status"], "rolled_back");
    assert_eq!(state.metadata["blue_green"]["green_percent"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_shift_completes() {
    let h = harness();
    let router = Arc::new(InMemoryRouter::new());
    let orchestrator = blue_green(
        &h,
        &router,
        ScriptedMonitor::default(),
        TrafficShiftStrategy::Immediate,
    );

    let outcome = orchestrator.deploy(&full_stack_analysis(), None).await;

    assert!(outcome.success());
    assert_eq!(outcome.final_split.green_percent, 100);
    assert_eq!(outcome.samples.len(), 1);
    assert!(!outcome.rollback_performed);
    assert_eq!(router.current().unwrap().green_percent, 100);
    assert_eq!(h.api.teardown_count(), 0);

    let state = h.store.get(&outcome.green.deployment_id).await.unwrap();
    assert_eq!(state.metadata["blue_green"]["status"], "completed");
}

#[tokio::test(start_paused = true)]
async fn test_shift_outliving_threshold_rolls_back() {
    let h = harness();
    let router = Arc::new(InMemoryRouter::new());
    let orchestrator = blue_green(
        &h,
        &router,
        ScriptedMonitor::default(),
        TrafficShiftStrategy::Canary {
            percent: 10,
            observation: Duration::from_secs(15 * 60),
        },
    );

    let outcome = orchestrator
        .deploy(&full_stack_analysis(), Some("blue-1".to_string()))
        .await;

    assert_eq!(outcome.status, BlueGreenStatus::RolledBack);
    assert!(outcome
        .rollback_reason
        .as_deref()
        .unwrap()
        .contains("did not complete"));
    assert!(!outcome.samples.is_empty());
    assert_eq!(router.history().first().unwrap().green_percent, 10);
    assert_eq!(router.current().unwrap().green_percent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_green_takes_no_traffic() {
    let mut builder = HarnessBuilder::new();
    builder.prober.unhealthy.insert(ComponentKind::Api);
    let h = builder.build();
    let router = Arc::new(InMemoryRouter::new());
    let orchestrator = blue_green(
        &h,
        &router,
        ScriptedMonitor::default(),
        TrafficShiftStrategy::Immediate,
    );

    let outcome = orchestrator
        .deploy(&full_stack_analysis(), Some("blue-1".to_string()))
        .await;

    assert_eq!(outcome.status, BlueGreenStatus::Failed);
    assert!(!outcome.rollback_performed);
    assert!(outcome.samples.is_empty());
    assert!(router.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_rollback_is_idempotent() {
    let h = harness();
    let router = Arc::new(InMemoryRouter::new());
    let orchestrator = blue_green(
        &h,
        &router,
        ScriptedMonitor::default(),
        TrafficShiftStrategy::Immediate,
    );
    let outcome = orchestrator
        .deploy(&full_stack_analysis(), Some("blue-1".to_string()))
        .await;
    assert!(outcome.success());
    let green_id = outcome.green.deployment_id.clone();

    assert!(orchestrator.rollback_deployment(&green_id).await.unwrap());
    assert_eq!(router.current().unwrap().green_percent, 0);
    assert_eq!(h.api.teardown_count(), 1);

    assert!(!orchestrator.rollback_deployment(&green_id).await.unwrap());
    assert_eq!(h.api.teardown_count(), 1);

    let state = h.store.get(&green_id).await.unwrap();
    assert_eq!(state.metadata["blue_green"]["status"], "rolled_back");
}

#[tokio::test(start_paused = true)]
async fn test_failed_route_back_keeps_green_until_manual_rollback() {
    let h = harness();
    let router = Arc::new(StuckRouter::new());
    let orchestrator = blue_green(
        &h,
        &router,
        ScriptedMonitor::with_rates(&[0.5]),
        TrafficShiftStrategy::Immediate,
    );

    let outcome = orchestrator
        .deploy(&full_stack_analysis(), Some("blue-1".to_string()))
        .await;

    // Green still holds all traffic, so it must not be reported as rolled back
    assert_eq!(outcome.status, BlueGreenStatus::RollbackFailed);
    assert!(!outcome.success());
    assert!(!outcome.rollback_performed);
    assert_eq!(outcome.final_split.green_percent, 100);
    let reason = outcome.rollback_reason.as_deref().unwrap();
    assert!(reason.contains("error rate"));
    assert!(reason.contains("load balancer rejected"));
    assert_eq!(router.inner.current().unwrap().green_percent, 100);
    assert_eq!(h.api.teardown_count(), 0);

    let green_id = outcome.green.deployment_id.clone();
    let state = h.store.get(&green_id).await.unwrap();
    assert_eq!(state.metadata["blue_green"]["status"], "rollback_failed");
    assert_eq!(state.metadata["blue_green"]["green_percent"], 100);

    assert!(orchestrator.rollback_deployment(&green_id).await.unwrap());
    assert_eq!(router.inner.current().unwrap().green_percent, 0);
    assert_eq!(h.database.teardown_count(), 1);
    assert_eq!(h.api.teardown_count(), 1);
    assert_eq!(h.frontend.teardown_count(), 1);

    assert!(!orchestrator.rollback_deployment(&green_id).await.unwrap());
    let state = h.store.get(&green_id).await.unwrap();
    assert_eq!(state.metadata["blue_green"]["status"], "rolled_back");
}

#[tokio::test(start_paused = true)]
async fn test_manual_rollback_surfaces_routing_error() {
    let h = harness();
    let router = Arc::new(StuckRouter::new());
    let orchestrator = blue_green(
        &h,
        &router,
        ScriptedMonitor::default(),
        TrafficShiftStrategy::Immediate,
    );
    let outcome = orchestrator
        .deploy(&full_stack_analysis(), Some("blue-1".to_string()))
        .await;
    assert!(outcome.success());
    let green_id = outcome.green.deployment_id.clone();

    let err = orchestrator.rollback_deployment(&green_id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::RoutingError(_)));
    assert_eq!(h.api.teardown_count(), 0);
    let state = h.store.get(&green_id).await.unwrap();
    assert_eq!(state.metadata["blue_green"]["status"], "rollback_failed");

    assert!(orchestrator.rollback_deployment(&green_id).await.unwrap());
    assert_eq!(h.api.teardown_count(), 1);
}
