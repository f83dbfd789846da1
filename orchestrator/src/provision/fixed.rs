//! Provisioner that adopts an already-running endpoint

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::errors::OrchestratorError;
use crate::models::analysis::{ComponentConfig, ComponentDeployment, ComponentKind};
use crate::provision::Provisioner;

/// Reports a configured endpoint as the deployed component.
///
/// A `endpoint` key in the component config overrides the configured value.
/// Nothing is created, so teardown is unsupported.
pub struct FixedEndpointProvisioner {
    kind: ComponentKind,
    endpoint: Option<String>,
    connection_info: Map<String, Value>,
}

impl FixedEndpointProvisioner {
    pub fn new(kind: ComponentKind, endpoint: Option<String>) -> Self {
        Self {
            kind,
            endpoint,
            connection_info: Map::new(),
        }
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_info.insert(
            "connection_string".to_string(),
            Value::String(connection_string.into()),
        );
        self
    }
}

#[async_trait]
impl Provisioner for FixedEndpointProvisioner {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    async fn deploy(
        &self,
        deployment_id: &str,
        config: &ComponentConfig,
    ) -> Result<ComponentDeployment, OrchestratorError> {
        let endpoint = config
            .get("endpoint")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .ok_or_else(|| {
                OrchestratorError::ConfigError(format!("No endpoint configured for {}", self.kind))
            })?;

        info!(
            deployment_id = %deployment_id,
            component = %self.kind,
            "Adopting existing endpoint {}",
            endpoint
        );

        let mut deployment = ComponentDeployment::new(endpoint);
        deployment.connection_info = self.connection_info.clone();
        Ok(deployment)
    }
}
