//! In-memory state store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::models::state::{DeploymentFilter, DeploymentState, StateMutation};
use crate::store::{apply_versioned, select, StateStore};

/// Process-local store; the lock is only held for the compare-and-swap itself
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, DeploymentState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create(&self, mut state: DeploymentState) -> Result<DeploymentState, OrchestratorError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&state.deployment_id) {
            return Err(OrchestratorError::AlreadyExists(state.deployment_id));
        }

        state.version = 1;
        state.updated_at = chrono::Utc::now();
        entries.insert(state.deployment_id.clone(), state.clone());
        Ok(state)
    }

    async fn update(
        &self,
        deployment_id: &str,
        expected_version: u64,
        mutation: StateMutation,
    ) -> Result<DeploymentState, OrchestratorError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let current = entries
            .get(deployment_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {}", deployment_id)))?;

        let next = apply_versioned(current, expected_version, &mutation)?;
        entries.insert(deployment_id.to_string(), next.clone());
        Ok(next)
    }

    async fn get(&self, deployment_id: &str) -> Result<DeploymentState, OrchestratorError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {}", deployment_id)))
    }

    async fn list(
        &self,
        filter: &DeploymentFilter,
        limit: usize,
    ) -> Result<Vec<DeploymentState>, OrchestratorError> {
        let states: Vec<DeploymentState> = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.values().cloned().collect()
        };
        Ok(select(states, filter, limit))
    }
}
