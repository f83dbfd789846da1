//! File-backed state store
//!
//! One pretty-printed JSON document per deployment, `<deployment_id>.json`,
//! written through a temp file and rename. A process-wide mutex serializes the
//! read-check-write sequence so the version check holds within one process.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::state::{DeploymentFilter, DeploymentState, StateMutation};
use crate::store::{apply_versioned, select, StateStore};

pub struct FileStateStore {
    dir: Dir,
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: Dir) -> Result<Self, OrchestratorError> {
        dir.create().await?;
        debug!("Opened state store at {}", dir.path().display());
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    fn record_file(&self, deployment_id: &str) -> Result<File, OrchestratorError> {
        let valid = !deployment_id.is_empty()
            && deployment_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(OrchestratorError::ConfigError(format!(
                "Invalid deployment id: {:?}",
                deployment_id
            )));
        }
        Ok(self.dir.file(&format!("{}.json", deployment_id)))
    }

    async fn read(&self, deployment_id: &str) -> Result<DeploymentState, OrchestratorError> {
        let file = self.record_file(deployment_id)?;
        if !file.exists().await {
            return Err(OrchestratorError::NotFound(format!(
                "deployment {}",
                deployment_id
            )));
        }
        file.read_json().await
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn create(&self, mut state: DeploymentState) -> Result<DeploymentState, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let file = self.record_file(&state.deployment_id)?;
        if file.exists().await {
            return Err(OrchestratorError::AlreadyExists(state.deployment_id));
        }

        state.version = 1;
        state.updated_at = chrono::Utc::now();
        file.write_json_atomic(&state).await?;
        Ok(state)
    }

    async fn update(
        &self,
        deployment_id: &str,
        expected_version: u64,
        mutation: StateMutation,
    ) -> Result<DeploymentState, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let current = self.read(deployment_id).await?;
        let next = apply_versioned(&current, expected_version, &mutation)?;
        self.record_file(deployment_id)?
            .write_json_atomic(&next)
            .await?;
        Ok(next)
    }

    async fn get(&self, deployment_id: &str) -> Result<DeploymentState, OrchestratorError> {
        self.read(deployment_id).await
    }

    async fn list(
        &self,
        filter: &DeploymentFilter,
        limit: usize,
    ) -> Result<Vec<DeploymentState>, OrchestratorError> {
        let mut states = Vec::new();
        for path in self.dir.list_files("json").await? {
            match File::new(path.clone()).read_json::<DeploymentState>().await {
                Ok(state) => states.push(state),
                Err(e) => warn!("Skipping unreadable state file {}: {}", path.display(), e),
            }
        }
        Ok(select(states, filter, limit))
    }
}
