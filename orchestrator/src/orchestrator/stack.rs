//! Full-stack orchestrator
//!
//! Drives one deployment through PLANNING, INFRASTRUCTURE, BACKEND, FRONTEND,
//! INTEGRATION and VALIDATION. Phase errors end in a FAILED result, never in an
//! `Err`. The state record is mirrored at every transition through versioned
//! updates; no lock is held across provisioning calls or probes.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::options::OrchestratorOptions;
use crate::deps::manager::DependencyManager;
use crate::errors::OrchestratorError;
use crate::models::analysis::{ComponentKind, RepoAnalysis};
use crate::models::result::{ComponentTiming, DeploymentPhase, FullStackDeployment, RollbackReport};
use crate::models::state::{DeploymentFilter, DeploymentState, DeploymentStatus, StateMutation};
use crate::orchestrator::fsm::{PhaseEvent, PhaseMachine};
use crate::orchestrator::journey::{run_journey, JourneyTargets};
use crate::orchestrator::plan::{DeploymentPlan, DEFAULT_API_HEALTH_PATH, DEFAULT_E2E_PATH};
use crate::probe::{HealthProber, HealthStatus, JourneyClient};
use crate::provision::{ProvisionerSet, TeardownOutcome};
use crate::store::StateStore;
use crate::utils::{elapsed_ms, generate_deployment_id, poll_until};

/// Stored record merged with live health of its recorded endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatusReport {
    pub state: DeploymentState,
    pub overall_healthy: bool,
    pub live_health: BTreeMap<String, HealthStatus>,
}

/// In-flight bookkeeping of one deployment
struct Run {
    fsm: PhaseMachine,
    result: FullStackDeployment,
    started: Instant,
    state_created: bool,
}

pub struct StackOrchestrator {
    store: Arc<dyn StateStore>,
    deps: DependencyManager,
    provisioners: ProvisionerSet,
    prober: Arc<dyn HealthProber>,
    journey: Arc<dyn JourneyClient>,
    options: OrchestratorOptions,
}

impl StackOrchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        provisioners: ProvisionerSet,
        prober: Arc<dyn HealthProber>,
        journey: Arc<dyn JourneyClient>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            deps: DependencyManager::new(store.clone(), prober.clone()),
            store,
            provisioners,
            prober,
            journey,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn dependency_manager(&self) -> &DependencyManager {
        &self.deps
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Deploy every component of `analysis` as one unit
    pub async fn deploy_full_stack_application(
        &self,
        analysis: &RepoAnalysis,
    ) -> FullStackDeployment {
        let deployment_id = generate_deployment_id();
        let mut run = Run {
            fsm: PhaseMachine::new(),
            result: FullStackDeployment::new(
                &deployment_id,
                &analysis.app_name,
                &self.options.health_check_placeholder,
            ),
            started: Instant::now(),
            state_created: false,
        };

        info!(
            deployment_id = %deployment_id,
            app = %analysis.app_name,
            "Starting full-stack deployment"
        );

        let plan = match self.plan(&mut run, analysis).await {
            Ok(plan) => plan,
            Err(e) => return self.fail(run, e).await,
        };

        match self.execute(&mut run, &plan).await {
            Ok(()) => self.complete(run).await,
            Err(e) => self.fail(run, e).await,
        }
    }

    async fn plan(
        &self,
        run: &mut Run,
        analysis: &RepoAnalysis,
    ) -> Result<DeploymentPlan, OrchestratorError> {
        let id = run.result.deployment_id.clone();
        let plan = DeploymentPlan::from_analysis(analysis)?;
        self.deps.build_graph(&id, plan.components.clone())?;

        let mut state = DeploymentState::new(&id, analysis);
        state.status = DeploymentStatus::Analyzing;
        state.metadata.insert("app_name".to_string(), json!(analysis.app_name));
        state.metadata.insert(
            "deployment_phase".to_string(),
            json!(DeploymentPhase::Planning.as_str()),
        );
        state.metadata.insert("deployment_order".to_string(), json!(plan.order));
        state.metadata.insert("plan_digest".to_string(), json!(plan.digest));

        self.store.create(state).await?;
        run.state_created = true;

        debug!(deployment_id = %id, order = ?plan.order, "Deployment planned");
        Ok(plan)
    }

    async fn execute(&self, run: &mut Run, plan: &DeploymentPlan) -> Result<(), OrchestratorError> {
        for kind in ComponentKind::ALL {
            self.advance(run).await?;
            let phase = run.fsm.phase();
            let names = plan.names_of(kind);
            if names.is_empty() {
                debug!(phase = %phase, "No {} component, skipping", kind);
                continue;
            }
            self.within(phase, Some(kind), self.deploy_components(run, &names, kind))
                .await?;
        }

        self.advance(run).await?;
        run.result.health_check_url = run
            .result
            .primary_health_url(&self.options.health_check_placeholder);
        self.within(DeploymentPhase::Integration, None, self.integrate(run, plan))
            .await?;

        self.advance(run).await?;
        self.within(DeploymentPhase::Validation, None, self.validate(run, plan))
            .await
    }

    /// Run a phase body under the phase timeout; a timeout is blamed on `component`
    async fn within<T, F>(
        &self,
        phase: DeploymentPhase,
        component: Option<ComponentKind>,
        body: F,
    ) -> Result<T, OrchestratorError>
    where
        F: Future<Output = Result<T, OrchestratorError>>,
    {
        let after = self.options.phase_timeout();
        match tokio::time::timeout(after, body).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Timeout {
                phase,
                component,
                after,
            }),
        }
    }

    async fn advance(&self, run: &mut Run) -> Result<(), OrchestratorError> {
        let phase = run
            .fsm
            .process(PhaseEvent::Advance)
            .map_err(OrchestratorError::Internal)?;
        run.result.deployment_phase = phase;

        info!(
            deployment_id = %run.result.deployment_id,
            phase = %phase,
            "Entering phase"
        );
        self.write_state(
            &run.result.deployment_id,
            StateMutation::new()
                .status(status_for(phase))
                .meta("deployment_phase", phase.as_str()),
        )
        .await?;
        Ok(())
    }

    async fn deploy_components(
        &self,
        run: &mut Run,
        names: &[String],
        kind: ComponentKind,
    ) -> Result<(), OrchestratorError> {
        let id = run.result.deployment_id.clone();
        for name in names {
            let config = self.deps.inject_configuration(&id, name).await?;
            let provisioner = self.provisioners.get(kind)?;

            let started_at = Utc::now();
            let start = Instant::now();
            info!(deployment_id = %id, component = %kind, "Deploying {}", name);

            let deployed = provisioner
                .deploy(&id, &config)
                .await
                .map_err(|e| match e {
                    OrchestratorError::ProvisioningFailure { .. } => e,
                    other => OrchestratorError::ProvisioningFailure {
                        component: kind,
                        reason: other.to_string(),
                    },
                })?;
            let duration_ms = elapsed_ms(start);

            run.result.set_endpoint(kind, &deployed.endpoint);
            run.result.component_deployment_times.insert(
                kind,
                ComponentTiming {
                    started_at,
                    duration_ms,
                },
            );

            self.write_state(
                &id,
                StateMutation::new().resource(
                    name.as_str(),
                    json!({
                        "kind": kind,
                        "endpoint": deployed.endpoint,
                        "identifier": deployed.teardown_id(),
                        "connection_info": deployed.connection_info,
                        "health_check_path": config.get("health_check_path"),
                        "deployed_at": Utc::now().to_rfc3339(),
                    }),
                ),
            )
            .await?;

            info!(
                deployment_id = %id,
                component = %kind,
                "Deployed {} at {} in {} ms",
                name,
                deployed.endpoint,
                duration_ms
            );
        }
        Ok(())
    }

    /// Probe every deployed component until healthy or the wait runs out
    async fn integrate(&self, run: &mut Run, plan: &DeploymentPlan) -> Result<(), OrchestratorError> {
        let targets: Vec<(ComponentKind, String)> = run
            .result
            .deployed_components()
            .into_iter()
            .filter_map(|kind| run.result.endpoint(kind).map(|e| (kind, e.to_string())))
            .collect();

        let checks = join_all(targets.iter().map(|(kind, endpoint)| {
            self.wait_healthy(endpoint, *kind, plan.setting(*kind, "health_check_path"))
        }))
        .await;

        let mut mutation = StateMutation::new();
        let mut unhealthy = Vec::new();
        let mut details = Vec::new();
        for ((kind, _), status) in targets.iter().zip(checks) {
            mutation = mutation.health(kind.as_str(), status.to_json());
            if !status.healthy {
                unhealthy.push(*kind);
                details.push(format!(
                    "{}: {}",
                    kind,
                    status.error.as_deref().unwrap_or("unhealthy")
                ));
            }
            run.result.health_checks.insert(*kind, status);
        }

        self.write_state(&run.result.deployment_id, mutation).await?;

        if !unhealthy.is_empty() {
            return Err(OrchestratorError::HealthCheckFailure {
                components: unhealthy,
                detail: details.join("; "),
            });
        }
        Ok(())
    }

    async fn wait_healthy(
        &self,
        endpoint: &str,
        kind: ComponentKind,
        health_path: Option<&str>,
    ) -> HealthStatus {
        let prober = &self.prober;
        let outcome = poll_until(
            move |_| prober.check_route(endpoint, kind, health_path),
            |status: &HealthStatus| status.healthy,
            self.options.health_wait_timeout,
            &self.options.health_backoff,
        )
        .await;

        if !outcome.satisfied {
            warn!(
                component = %kind,
                "{} still unhealthy after {} probes",
                endpoint,
                outcome.attempts
            );
        }
        outcome.value
    }

    async fn validate(&self, run: &mut Run, plan: &DeploymentPlan) -> Result<(), OrchestratorError> {
        let mandatory = plan.includes(ComponentKind::Api) && plan.includes(ComponentKind::Database);
        let targets = JourneyTargets {
            frontend_url: run.result.frontend_url.clone(),
            api_endpoint: run.result.api_endpoint.clone(),
            database_endpoint: run.result.database_endpoint.clone(),
            api_health_path: plan
                .setting(ComponentKind::Api, "health_check_path")
                .unwrap_or(DEFAULT_API_HEALTH_PATH)
                .to_string(),
            e2e_path: plan
                .setting(ComponentKind::Api, "e2e_path")
                .unwrap_or(DEFAULT_E2E_PATH)
                .to_string(),
        };

        let outcome = run_journey(self.journey.as_ref(), &targets, mandatory).await;
        let passed = outcome.success;
        let reason = outcome
            .error
            .clone()
            .unwrap_or_else(|| "journey failed".to_string());

        self.write_state(
            &run.result.deployment_id,
            StateMutation::new().meta(
                "e2e_test",
                json!({
                    "success": outcome.success,
                    "mandatory": mandatory,
                    "response_time_ms": outcome.response_time_ms,
                }),
            ),
        )
        .await?;
        run.result.e2e_test_result = Some(outcome);

        if passed {
            return Ok(());
        }
        if mandatory {
            return Err(OrchestratorError::ValidationFailure(reason));
        }

        warn!(
            deployment_id = %run.result.deployment_id,
            "End-to-end validation failed but is not mandatory: {}",
            reason
        );
        run.result
            .warnings
            .push(format!("End-to-end validation failed: {}", reason));
        Ok(())
    }

    async fn complete(&self, mut run: Run) -> FullStackDeployment {
        if let Err(e) = run.fsm.process(PhaseEvent::Advance) {
            return self.fail(run, OrchestratorError::Internal(e)).await;
        }

        run.result.deployment_phase = DeploymentPhase::Completed;
        run.result.success = true;
        run.result.phase_durations_ms = run.fsm.durations().clone();
        run.result.total_deployment_ms = elapsed_ms(run.started);

        info!(
            deployment_id = %run.result.deployment_id,
            "Deployment completed in {} ms",
            run.result.total_deployment_ms
        );

        let mutation = self
            .summary_mutation(&run.result)
            .status(DeploymentStatus::Completed);
        self.write_terminal(&run.result.deployment_id, mutation).await;
        self.deps.release(&run.result.deployment_id);
        run.result
    }

    async fn fail(&self, mut run: Run, err: OrchestratorError) -> FullStackDeployment {
        let id = run.result.deployment_id.clone();
        let phase = run.fsm.phase();
        let component = err.component();

        let message = match component {
            Some(component) => format!("{} phase failed for {}: {}", phase, component, err),
            None => format!("{} phase failed: {}", phase, err),
        };

        if err.is_invariant_violation() {
            error!(
                deployment_id = %id,
                phase = %phase,
                "Orchestrator invariant violated: {}",
                err
            );
        } else {
            error!(
                deployment_id = %id,
                phase = %phase,
                component = ?component,
                "{}",
                message
            );
        }

        if let Err(e) = run.fsm.process(PhaseEvent::Fail {
            error: message.clone(),
            component,
        }) {
            warn!(deployment_id = %id, "{}", e);
        }

        // Nothing exists yet before INFRASTRUCTURE completes
        let rollback = self.options.rollback_on_failure
            && run.state_created
            && !matches!(phase, DeploymentPhase::Planning | DeploymentPhase::Infrastructure);
        if rollback {
            match self.rollback(&id, None).await {
                Ok(report) => run.result.rollback = Some(report),
                Err(e) => warn!(deployment_id = %id, "Rollback after failure failed: {}", e),
            }
        }

        run.result.deployment_phase = DeploymentPhase::Failed;
        run.result.failed_phase = run.fsm.failed_in();
        run.result.failed_component = run.fsm.failed_component();
        run.result.success = false;
        run.result.error_message = run.fsm.error().map(str::to_string);
        run.result.phase_durations_ms = run.fsm.durations().clone();
        run.result.total_deployment_ms = elapsed_ms(run.started);

        if run.state_created {
            let mutation = self
                .summary_mutation(&run.result)
                .status(DeploymentStatus::Failed)
                .meta("failed_phase", phase.as_str())
                .meta("error_message", message);
            self.write_terminal(&id, mutation).await;
        }
        self.deps.release(&id);
        run.result
    }

    fn summary_mutation(&self, result: &FullStackDeployment) -> StateMutation {
        StateMutation::new()
            .meta("deployment_phase", result.deployment_phase.as_str())
            .meta("health_check_url", result.health_check_url.as_str())
            .meta("total_deployment_ms", result.total_deployment_ms)
            .meta(
                "component_deployment_times",
                serde_json::to_value(&result.component_deployment_times).unwrap_or(Value::Null),
            )
            .meta(
                "phase_durations_ms",
                serde_json::to_value(&result.phase_durations_ms).unwrap_or(Value::Null),
            )
    }

    /// Read-modify-write at the version just read; conflicts go to the caller
    async fn write_state(
        &self,
        deployment_id: &str,
        mutation: StateMutation,
    ) -> Result<DeploymentState, OrchestratorError> {
        let current = self.store.get(deployment_id).await?;
        self.store
            .update(deployment_id, current.version, mutation)
            .await
    }

    async fn write_terminal(&self, deployment_id: &str, mutation: StateMutation) {
        if let Err(e) = self.write_state(deployment_id, mutation).await {
            warn!(
                deployment_id = %deployment_id,
                "Failed to record final deployment state: {}",
                e
            );
        }
    }

    /// Tear down one component, or every recorded component in reverse
    /// deployment order. Best effort; a second call is a no-op.
    pub async fn rollback(
        &self,
        deployment_id: &str,
        component: Option<ComponentKind>,
    ) -> Result<RollbackReport, OrchestratorError> {
        let state = self.store.get(deployment_id).await?;
        let mut targets: Vec<(String, ComponentKind, String)> = state
            .resources
            .iter()
            .filter_map(|(name, resource)| {
                let kind: ComponentKind = resource
                    .get("kind")
                    .and_then(|k| k.as_str())
                    .unwrap_or(name)
                    .parse()
                    .ok()?;
                let identifier = resource
                    .get("identifier")
                    .or_else(|| resource.get("endpoint"))
                    .and_then(|v| v.as_str())?
                    .to_string();
                Some((name.clone(), kind, identifier))
            })
            .filter(|(_, kind, _)| component.is_none_or(|c| c == *kind))
            .collect();
        targets.sort_by_key(|(_, kind, _)| std::cmp::Reverse(kind.priority()));

        let mut report = RollbackReport {
            deployment_id: deployment_id.to_string(),
            ..Default::default()
        };

        if targets.is_empty() {
            info!(deployment_id = %deployment_id, "Nothing to roll back");
            report.no_op = true;
            return Ok(report);
        }

        if component.is_none() {
            self.write_state(
                deployment_id,
                StateMutation::new().status(DeploymentStatus::RollingBack),
            )
            .await?;
        }

        let mut released = StateMutation::new();
        let mut rolled_back: Vec<Value> = state
            .metadata
            .get("rolled_back_components")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        for (name, kind, identifier) in targets {
            report.attempted += 1;
            let outcome = match self.provisioners.get(kind) {
                Ok(provisioner) => provisioner.teardown(&identifier).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(TeardownOutcome::Removed) => {
                    info!(deployment_id = %deployment_id, component = %kind, "Tore down {}", name);
                    report.torn_down += 1;
                }
                Ok(TeardownOutcome::Unsupported) => {
                    debug!(deployment_id = %deployment_id, component = %kind, "No teardown for {}", name);
                    report.skipped.push(kind);
                }
                Err(e) => {
                    warn!(deployment_id = %deployment_id, component = %kind, "Teardown of {} failed: {}", name, e);
                    report.failures.push(format!("{}: {}", name, e));
                    continue;
                }
            }
            released = released.remove_resource(name.as_str());
            rolled_back.push(Value::from(name));
        }

        released = released.meta("rolled_back_components", rolled_back);
        if component.is_none() {
            released = released
                .status(DeploymentStatus::Failed)
                .meta("rollback_message", format!("Rolled back: {}", report.summary()));
        }
        self.write_state(deployment_id, released).await?;

        info!(
            deployment_id = %deployment_id,
            "Rollback finished: {}",
            report.summary()
        );
        Ok(report)
    }

    /// Stored record merged with live health of its recorded endpoints
    pub async fn get_deployment_status(
        &self,
        deployment_id: &str,
    ) -> Result<DeploymentStatusReport, OrchestratorError> {
        let health = self.deps.monitor_dependency_health(deployment_id).await?;
        let state = self.store.get(deployment_id).await?;
        Ok(DeploymentStatusReport {
            state,
            overall_healthy: health.overall_healthy,
            live_health: health.per_component,
        })
    }

    pub async fn list_deployments(
        &self,
        filter: &DeploymentFilter,
        limit: usize,
    ) -> Result<Vec<DeploymentState>, OrchestratorError> {
        self.store.list(filter, limit).await
    }
}

/// Record status mirrored for each phase
fn status_for(phase: DeploymentPhase) -> DeploymentStatus {
    match phase {
        DeploymentPhase::Planning => DeploymentStatus::Analyzing,
        DeploymentPhase::Infrastructure => DeploymentStatus::Building,
        DeploymentPhase::Backend
        | DeploymentPhase::Frontend
        | DeploymentPhase::Integration
        | DeploymentPhase::Validation => DeploymentStatus::Deploying,
        DeploymentPhase::Completed => DeploymentStatus::Completed,
        DeploymentPhase::Failed => DeploymentStatus::Failed,
    }
}
