//! Deployment state store
//!
//! Every record carries a version that starts at 1 and grows by exactly one on
//! each successful update. Updates name the version they read; a stale version
//! is rejected with [`OrchestratorError::ConcurrencyConflict`] and leaves the
//! record untouched. Conflicts are never retried here.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::models::state::{DeploymentFilter, DeploymentState, StateMutation};

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;

/// Persistence contract for deployment records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a new record with `version = 1`
    async fn create(&self, state: DeploymentState) -> Result<DeploymentState, OrchestratorError>;

    /// Apply `mutation` if the stored version equals `expected_version`
    async fn update(
        &self,
        deployment_id: &str,
        expected_version: u64,
        mutation: StateMutation,
    ) -> Result<DeploymentState, OrchestratorError>;

    /// Fetch a record
    async fn get(&self, deployment_id: &str) -> Result<DeploymentState, OrchestratorError>;

    /// Records matching `filter`, newest first, at most `limit`
    async fn list(
        &self,
        filter: &DeploymentFilter,
        limit: usize,
    ) -> Result<Vec<DeploymentState>, OrchestratorError>;
}

/// Compare-and-swap shared by the backends: check the version, apply the
/// mutation and bump version and `updated_at`.
pub(crate) fn apply_versioned(
    current: &DeploymentState,
    expected_version: u64,
    mutation: &StateMutation,
) -> Result<DeploymentState, OrchestratorError> {
    if current.version != expected_version {
        return Err(OrchestratorError::ConcurrencyConflict {
            deployment_id: current.deployment_id.clone(),
            expected: expected_version,
            actual: current.version,
        });
    }

    let mut next = current.clone();
    mutation.apply(&mut next);
    next.version = current.version + 1;
    next.updated_at = chrono::Utc::now();
    Ok(next)
}

/// Newest-first ordering and limit shared by the backends
pub(crate) fn select(
    mut states: Vec<DeploymentState>,
    filter: &DeploymentFilter,
    limit: usize,
) -> Vec<DeploymentState> {
    states.retain(|s| filter.matches(s));
    states.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    states.truncate(limit);
    states
}
