//! Error types for the deployment orchestrator

use std::time::Duration;

use thiserror::Error;

use crate::models::analysis::ComponentKind;
use crate::models::result::DeploymentPhase;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cyclic dependency between components: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency { component: String, dependency: String },

    #[error("Component '{component}' cannot be configured: dependency '{dependency}' has no recorded endpoint")]
    DependencyNotReady { component: String, dependency: String },

    #[error("Provisioning of {component} failed: {reason}")]
    ProvisioningFailure { component: ComponentKind, reason: String },

    #[error("Health check failed for {}: {detail}", join_kinds(.components))]
    HealthCheckFailure {
        components: Vec<ComponentKind>,
        detail: String,
    },

    #[error("End-to-end validation failed: {0}")]
    ValidationFailure(String),

    #[error("Deployment {deployment_id} changed concurrently (expected version {expected}, found {actual})")]
    ConcurrencyConflict {
        deployment_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Deployment already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{phase} phase timed out after {after:?}")]
    Timeout {
        phase: DeploymentPhase,
        component: Option<ComponentKind>,
        after: Duration,
    },

    #[error("Traffic shift aborted: {0}")]
    TrafficShiftBreach(String),

    #[error("Routing error: {0}")]
    RoutingError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Component the error is attributed to, if any
    pub fn component(&self) -> Option<ComponentKind> {
        match self {
            OrchestratorError::ProvisioningFailure { component, .. } => Some(*component),
            OrchestratorError::HealthCheckFailure { components, .. } => components.first().copied(),
            OrchestratorError::DependencyNotReady { component, .. } => component.parse().ok(),
            OrchestratorError::Timeout { component, .. } => *component,
            _ => None,
        }
    }

    /// Errors that mean the orchestrator sequenced its own phases wrongly
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, OrchestratorError::DependencyNotReady { .. })
    }
}

fn join_kinds(kinds: &[ComponentKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
