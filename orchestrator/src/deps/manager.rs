//! Dependency manager: graph registry, configuration injection and
//! dependency health monitoring

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::deps::graph::{ComponentSpec, DependencyGraph};
use crate::errors::OrchestratorError;
use crate::models::analysis::{ComponentConfig, ComponentKind};
use crate::models::state::DeploymentState;
use crate::probe::{HealthProber, HealthStatus};
use crate::store::StateStore;

/// Aggregated health of every component with a recorded endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealthReport {
    pub overall_healthy: bool,
    pub per_component: BTreeMap<String, HealthStatus>,
}

/// Owns the dependency graph of each in-flight deployment
pub struct DependencyManager {
    store: Arc<dyn StateStore>,
    prober: Arc<dyn HealthProber>,
    graphs: RwLock<HashMap<String, DependencyGraph>>,
}

impl DependencyManager {
    pub fn new(store: Arc<dyn StateStore>, prober: Arc<dyn HealthProber>) -> Self {
        Self {
            store,
            prober,
            graphs: RwLock::new(HashMap::new()),
        }
    }

    /// Build and register the graph of a deployment
    pub fn build_graph(
        &self,
        deployment_id: &str,
        components: IndexMap<String, ComponentSpec>,
    ) -> Result<DependencyGraph, OrchestratorError> {
        let graph = DependencyGraph::build(deployment_id, components)?;
        debug!(
            deployment_id = %deployment_id,
            order = ?graph.resolution_order(),
            "Resolved component dependencies"
        );

        let mut graphs = self.graphs.write().unwrap_or_else(|e| e.into_inner());
        graphs.insert(deployment_id.to_string(), graph.clone());
        Ok(graph)
    }

    /// Topological deployment order of a graph
    pub fn resolution_order(&self, graph: &DependencyGraph) -> Vec<String> {
        graph.resolution_order().to_vec()
    }

    /// Registered graph of a deployment
    pub fn graph(&self, deployment_id: &str) -> Option<DependencyGraph> {
        let graphs = self.graphs.read().unwrap_or_else(|e| e.into_inner());
        graphs.get(deployment_id).cloned()
    }

    /// Forget the graph of a finished deployment
    pub fn release(&self, deployment_id: &str) {
        let mut graphs = self.graphs.write().unwrap_or_else(|e| e.into_inner());
        graphs.remove(deployment_id);
    }

    /// Merge the endpoints of `component`'s dependencies into its config.
    ///
    /// Fails with `DependencyNotReady` when a required dependency has no
    /// recorded endpoint; optional dependencies without one are skipped.
    pub async fn inject_configuration(
        &self,
        deployment_id: &str,
        component: &str,
    ) -> Result<ComponentConfig, OrchestratorError> {
        let graph = self.graph(deployment_id).ok_or_else(|| {
            OrchestratorError::NotFound(format!("dependency graph for {}", deployment_id))
        })?;
        let spec = graph.component(component).ok_or_else(|| {
            OrchestratorError::NotFound(format!(
                "component {} in deployment {}",
                component, deployment_id
            ))
        })?;

        let state = self.store.get(deployment_id).await?;
        let mut config = spec.config.clone();

        for edge in &spec.depends_on {
            let Some(endpoint) = state.endpoint_of(&edge.name) else {
                if edge.required {
                    return Err(OrchestratorError::DependencyNotReady {
                        component: component.to_string(),
                        dependency: edge.name.clone(),
                    });
                }
                debug!(
                    deployment_id = %deployment_id,
                    component = %component,
                    "Optional dependency {} not deployed, skipping injection",
                    edge.name
                );
                continue;
            };

            let kind = graph
                .component(&edge.name)
                .map(|d| d.kind)
                .ok_or_else(|| OrchestratorError::UnknownDependency {
                    component: component.to_string(),
                    dependency: edge.name.clone(),
                })?;

            inject(&mut config, kind, endpoint, &state, &edge.name);
            info!(
                deployment_id = %deployment_id,
                component = %component,
                "Injected {} endpoint from {}",
                kind,
                edge.name
            );
        }

        let mut graphs = self.graphs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(spec) = graphs
            .get_mut(deployment_id)
            .and_then(|g| g.component_mut(component))
        {
            spec.config = config.clone();
        }

        Ok(config)
    }

    /// Re-probe every component with a recorded endpoint; read-only
    pub async fn monitor_dependency_health(
        &self,
        deployment_id: &str,
    ) -> Result<DependencyHealthReport, OrchestratorError> {
        let state = self.store.get(deployment_id).await?;
        let graph = self.graph(deployment_id);

        let targets: Vec<(String, String, ComponentKind, Option<String>)> = state
            .resources
            .iter()
            .filter_map(|(name, resource)| {
                let endpoint = resource.get("endpoint")?.as_str()?.to_string();
                let kind = resource_kind(name, resource, graph.as_ref())?;
                let health_path = resource
                    .get("health_check_path")
                    .and_then(|p| p.as_str())
                    .map(str::to_string);
                Some((name.clone(), endpoint, kind, health_path))
            })
            .collect();

        let checks = join_all(targets.iter().map(|(_, endpoint, kind, health_path)| {
            self.prober
                .check_route(endpoint, *kind, health_path.as_deref())
        }))
        .await;

        let per_component: BTreeMap<String, HealthStatus> = targets
            .into_iter()
            .map(|(name, _, _, _)| name)
            .zip(checks)
            .collect();

        let overall_healthy = per_component.values().all(|s| s.healthy);
        if !overall_healthy {
            warn!(
                deployment_id = %deployment_id,
                "Unhealthy components: {:?}",
                per_component
                    .iter()
                    .filter(|(_, s)| !s.healthy)
                    .map(|(n, _)| n.as_str())
                    .collect::<Vec<_>>()
            );
        }

        Ok(DependencyHealthReport {
            overall_healthy,
            per_component,
        })
    }
}

fn inject(
    config: &mut ComponentConfig,
    kind: ComponentKind,
    endpoint: &str,
    state: &DeploymentState,
    dependency: &str,
) {
    match kind {
        ComponentKind::Api => {
            config.insert("api_endpoint".to_string(), Value::from(endpoint));
        }
        ComponentKind::Database => {
            let connection = state
                .resources
                .get(dependency)
                .and_then(|r| r.get("connection_info"))
                .and_then(|c| c.get("connection_string"))
                .and_then(|v| v.as_str())
                .unwrap_or(endpoint);
            config.insert("database_endpoint".to_string(), Value::from(endpoint));
            config.insert("database_connection".to_string(), Value::from(connection));
        }
        ComponentKind::Frontend => {
            config.insert("frontend_url".to_string(), Value::from(endpoint));
        }
    }
}

/// Kind of a recorded resource: its own `kind` field, else the graph, else its name
fn resource_kind(
    name: &str,
    resource: &Value,
    graph: Option<&DependencyGraph>,
) -> Option<ComponentKind> {
    resource
        .get("kind")
        .and_then(|k| k.as_str())
        .and_then(|k| k.parse().ok())
        .or_else(|| graph.and_then(|g| g.component(name)).map(|s| s.kind))
        .or_else(|| name.parse().ok())
}
