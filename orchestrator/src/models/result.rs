//! Orchestration result models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::analysis::ComponentKind;
use crate::probe::HealthStatus;

/// Stage of the stack orchestrator's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentPhase {
    Planning,
    Infrastructure,
    Backend,
    Frontend,
    Integration,
    Validation,
    Completed,
    Failed,
}

impl DeploymentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentPhase::Planning => "PLANNING",
            DeploymentPhase::Infrastructure => "INFRASTRUCTURE",
            DeploymentPhase::Backend => "BACKEND",
            DeploymentPhase::Frontend => "FRONTEND",
            DeploymentPhase::Integration => "INTEGRATION",
            DeploymentPhase::Validation => "VALIDATION",
            DeploymentPhase::Completed => "COMPLETED",
            DeploymentPhase::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentPhase::Completed | DeploymentPhase::Failed)
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a component started deploying and how long it took
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTiming {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// One step of the end-to-end user journey
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyStep {
    pub name: String,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    pub latency_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of the end-to-end validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E2eTestResult {
    pub success: bool,

    /// Whether failure of the journey fails the deployment
    pub mandatory: bool,

    pub steps: Vec<JourneyStep>,

    /// Total wall-clock time across the journey
    pub response_time_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Identifier of the synthetic record created by the full-flow step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic_record_id: Option<String>,

    pub cleanup_performed: bool,
}

/// Outcome of a rollback request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackReport {
    pub deployment_id: String,

    /// Components a teardown was attempted for
    pub attempted: usize,

    /// Components successfully torn down
    pub torn_down: usize,

    /// Components whose provisioner has no teardown
    #[serde(default)]
    pub skipped: Vec<ComponentKind>,

    #[serde(default)]
    pub failures: Vec<String>,

    /// Nothing was left to roll back
    pub no_op: bool,
}

impl RollbackReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.no_op {
            return "nothing to roll back".to_string();
        }
        format!(
            "{} of {} components torn down",
            self.torn_down, self.attempted
        )
    }
}

/// Result of one full-stack deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullStackDeployment {
    pub deployment_id: String,
    pub app_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_endpoint: Option<String>,

    pub health_check_url: String,

    pub deployment_phase: DeploymentPhase,

    /// Phase in which the deployment failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<DeploymentPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_component: Option<ComponentKind>,

    pub success: bool,

    /// Deployed components in deployment order
    pub component_deployment_times: IndexMap<ComponentKind, ComponentTiming>,

    pub phase_durations_ms: BTreeMap<DeploymentPhase, u64>,

    pub health_checks: BTreeMap<ComponentKind, HealthStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e2e_test_result: Option<E2eTestResult>,

    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackReport>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub total_deployment_ms: u64,
}

impl FullStackDeployment {
    /// Empty result in the planning phase
    pub fn new(
        deployment_id: impl Into<String>,
        app_name: impl Into<String>,
        health_check_url: impl Into<String>,
    ) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            app_name: app_name.into(),
            frontend_url: None,
            api_endpoint: None,
            database_endpoint: None,
            health_check_url: health_check_url.into(),
            deployment_phase: DeploymentPhase::Planning,
            failed_phase: None,
            failed_component: None,
            success: false,
            component_deployment_times: IndexMap::new(),
            phase_durations_ms: BTreeMap::new(),
            health_checks: BTreeMap::new(),
            e2e_test_result: None,
            warnings: Vec::new(),
            rollback: None,
            error_message: None,
            total_deployment_ms: 0,
        }
    }

    pub fn set_endpoint(&mut self, kind: ComponentKind, endpoint: impl Into<String>) {
        let endpoint = Some(endpoint.into());
        match kind {
            ComponentKind::Database => self.database_endpoint = endpoint,
            ComponentKind::Api => self.api_endpoint = endpoint,
            ComponentKind::Frontend => self.frontend_url = endpoint,
        }
    }

    /// Frontend URL, else API endpoint, else `placeholder`
    pub fn primary_health_url(&self, placeholder: &str) -> String {
        self.frontend_url
            .as_deref()
            .or(self.api_endpoint.as_deref())
            .unwrap_or(placeholder)
            .to_string()
    }

    pub fn endpoint(&self, kind: ComponentKind) -> Option<&str> {
        match kind {
            ComponentKind::Database => self.database_endpoint.as_deref(),
            ComponentKind::Api => self.api_endpoint.as_deref(),
            ComponentKind::Frontend => self.frontend_url.as_deref(),
        }
    }

    /// Components that were deployed, in deployment order
    pub fn deployed_components(&self) -> Vec<ComponentKind> {
        self.component_deployment_times.keys().copied().collect()
    }
}
