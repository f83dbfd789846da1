//! Provisioning primitives

pub mod fixed;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::OrchestratorError;
use crate::models::analysis::{ComponentConfig, ComponentDeployment, ComponentKind};

pub use fixed::FixedEndpointProvisioner;

/// What a teardown call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    Removed,
    /// The provisioner cannot remove what it deployed
    Unsupported,
}

/// Deploys one kind of component
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Component kind this provisioner deploys
    fn kind(&self) -> ComponentKind;

    /// Deploy the component; may take minutes
    async fn deploy(
        &self,
        deployment_id: &str,
        config: &ComponentConfig,
    ) -> Result<ComponentDeployment, OrchestratorError>;

    /// Remove a previously deployed component
    async fn teardown(&self, _identifier: &str) -> Result<TeardownOutcome, OrchestratorError> {
        Ok(TeardownOutcome::Unsupported)
    }
}

/// Provisioners for the three component kinds
#[derive(Clone, Default)]
pub struct ProvisionerSet {
    database: Option<Arc<dyn Provisioner>>,
    api: Option<Arc<dyn Provisioner>>,
    frontend: Option<Arc<dyn Provisioner>>,
}

impl ProvisionerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provisioner under the kind it reports
    pub fn with(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        match provisioner.kind() {
            ComponentKind::Database => self.database = Some(provisioner),
            ComponentKind::Api => self.api = Some(provisioner),
            ComponentKind::Frontend => self.frontend = Some(provisioner),
        }
        self
    }

    /// Provisioner for `kind`
    pub fn get(&self, kind: ComponentKind) -> Result<Arc<dyn Provisioner>, OrchestratorError> {
        let provisioner = match kind {
            ComponentKind::Database => self.database.as_ref(),
            ComponentKind::Api => self.api.as_ref(),
            ComponentKind::Frontend => self.frontend.as_ref(),
        };
        provisioner.cloned().ok_or_else(|| {
            OrchestratorError::ConfigError(format!("No provisioner registered for {}", kind))
        })
    }

    pub fn has(&self, kind: ComponentKind) -> bool {
        self.get(kind).is_ok()
    }
}
