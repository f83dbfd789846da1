//! Persisted deployment state

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::analysis::RepoAnalysis;

/// Lifecycle status of a deployment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Pending,
    Analyzing,
    Building,
    Deploying,
    Completed,
    Failed,
    RollingBack,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "PENDING",
            DeploymentStatus::Analyzing => "ANALYZING",
            DeploymentStatus::Building => "BUILDING",
            DeploymentStatus::Deploying => "DEPLOYING",
            DeploymentStatus::Completed => "COMPLETED",
            DeploymentStatus::Failed => "FAILED",
            DeploymentStatus::RollingBack => "ROLLING_BACK",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Completed | DeploymentStatus::Failed)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "PENDING" => Ok(DeploymentStatus::Pending),
            "ANALYZING" => Ok(DeploymentStatus::Analyzing),
            "BUILDING" => Ok(DeploymentStatus::Building),
            "DEPLOYING" => Ok(DeploymentStatus::Deploying),
            "COMPLETED" => Ok(DeploymentStatus::Completed),
            "FAILED" => Ok(DeploymentStatus::Failed),
            "ROLLING_BACK" => Ok(DeploymentStatus::RollingBack),
            _ => Err(format!("Invalid deployment status: {}", s)),
        }
    }
}

/// One record per deployment attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub deployment_id: String,
    pub status: DeploymentStatus,

    pub stack_type: String,
    pub primary_stack: String,
    #[serde(default)]
    pub secondary_stacks: Vec<String>,

    /// Provisioned resources keyed by component name
    #[serde(default)]
    pub resources: Map<String, Value>,

    /// Last known health per component
    #[serde(default)]
    pub health_checks: Map<String, Value>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Optimistic concurrency token, starts at 1
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentState {
    /// New pending record carrying the analysis labels
    pub fn new(deployment_id: impl Into<String>, analysis: &RepoAnalysis) -> Self {
        let now = Utc::now();
        Self {
            deployment_id: deployment_id.into(),
            status: DeploymentStatus::Pending,
            stack_type: analysis.stack_type.clone(),
            primary_stack: analysis.primary_stack.clone(),
            secondary_stacks: analysis.secondary_stacks.clone(),
            resources: Map::new(),
            health_checks: Map::new(),
            metadata: Map::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recorded endpoint of a component, if it has been deployed
    pub fn endpoint_of(&self, component: &str) -> Option<&str> {
        self.resources
            .get(component)
            .and_then(|r| r.get("endpoint"))
            .and_then(|v| v.as_str())
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Set of field changes applied by a versioned update
#[derive(Debug, Clone, Default)]
pub struct StateMutation {
    status: Option<DeploymentStatus>,
    resources: Vec<(String, Value)>,
    removed_resources: Vec<String>,
    health_checks: Vec<(String, Value)>,
    metadata: Vec<(String, Value)>,
}

impl StateMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn resource(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.resources.push((key.into(), value.into()));
        self
    }

    pub fn remove_resource(mut self, key: impl Into<String>) -> Self {
        self.removed_resources.push(key.into());
        self
    }

    pub fn health(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.health_checks.push((key.into(), value.into()));
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.resources.is_empty()
            && self.removed_resources.is_empty()
            && self.health_checks.is_empty()
            && self.metadata.is_empty()
    }

    /// Apply the changes; version and timestamps are the store's concern
    pub fn apply(&self, state: &mut DeploymentState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        for (key, value) in &self.resources {
            state.resources.insert(key.clone(), value.clone());
        }
        for key in &self.removed_resources {
            state.resources.remove(key);
        }
        for (key, value) in &self.health_checks {
            state.health_checks.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.metadata {
            state.metadata.insert(key.clone(), value.clone());
        }
    }
}

/// Listing filter
#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub status: Option<DeploymentStatus>,
    pub stack_type: Option<String>,
}

impl DeploymentFilter {
    pub fn with_status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            stack_type: None,
        }
    }

    pub fn matches(&self, state: &DeploymentState) -> bool {
        if let Some(status) = self.status {
            if state.status != status {
                return false;
            }
        }
        if let Some(stack_type) = &self.stack_type {
            if &state.stack_type != stack_type {
                return false;
            }
        }
        true
    }
}
