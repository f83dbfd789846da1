//! Deployment planning: analysis validation, default configs and component graph

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::deps::graph::{ComponentSpec, DependencyEdge, DependencyGraph};
use crate::errors::OrchestratorError;
use crate::models::analysis::{ComponentConfig, ComponentKind, RepoAnalysis};
use crate::utils::sha256_hash;

pub const DEFAULT_API_HEALTH_PATH: &str = "/health";
pub const DEFAULT_E2E_PATH: &str = "/api/e2e-test";

const PYTHON_STACKS: [&str; 4] = ["python", "fastapi", "django", "flask"];

/// Resolved plan for one deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub app_name: String,

    /// Components keyed by name, configs filled with defaults
    pub components: IndexMap<String, ComponentSpec>,

    /// Deployment order
    pub order: Vec<String>,

    /// Digest of the resolved components
    pub digest: String,
}

impl DeploymentPlan {
    /// Validate `analysis` and resolve its components; no side effects
    pub fn from_analysis(analysis: &RepoAnalysis) -> Result<Self, OrchestratorError> {
        validate(analysis)?;

        let components = components_for(analysis);
        let graph = DependencyGraph::build(analysis.app_name.clone(), components.clone())?;
        let digest = sha256_hash(&serde_json::to_vec(&components)?);

        Ok(Self {
            app_name: analysis.app_name.clone(),
            components,
            order: graph.resolution_order().to_vec(),
            digest,
        })
    }

    pub fn includes(&self, kind: ComponentKind) -> bool {
        self.components.values().any(|c| c.kind == kind)
    }

    /// Names of the components of `kind`, in deployment order
    pub fn names_of(&self, kind: ComponentKind) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.components.get(*name).is_some_and(|c| c.kind == kind))
            .cloned()
            .collect()
    }

    /// String setting of the first component of `kind`
    pub fn setting(&self, kind: ComponentKind, key: &str) -> Option<&str> {
        self.components
            .values()
            .find(|c| c.kind == kind)
            .and_then(|c| c.config.get(key))
            .and_then(|v| v.as_str())
    }
}

fn validate(analysis: &RepoAnalysis) -> Result<(), OrchestratorError> {
    if analysis.app_name.trim().is_empty() {
        return Err(OrchestratorError::ConfigError(
            "Analysis has no app_name".to_string(),
        ));
    }
    if analysis.components().is_empty() {
        return Err(OrchestratorError::ConfigError(format!(
            "Analysis of {} declares no frontend, api or database",
            analysis.app_name
        )));
    }
    if analysis.api_depends_on_database && !(analysis.has_api && analysis.needs_database()) {
        return Err(OrchestratorError::ConfigError(
            "api_depends_on_database requires both an api and a database".to_string(),
        ));
    }
    if analysis.frontend_depends_on_api && !(analysis.has_frontend && analysis.has_api) {
        return Err(OrchestratorError::ConfigError(
            "frontend_depends_on_api requires both a frontend and an api".to_string(),
        ));
    }
    Ok(())
}

/// Declared edges become required; a present but undeclared upstream
/// component is wired as an optional edge.
fn components_for(analysis: &RepoAnalysis) -> IndexMap<String, ComponentSpec> {
    let mut components = IndexMap::new();

    for kind in analysis.components() {
        let mut spec = ComponentSpec::new(kind).with_config(config_with_defaults(analysis, kind));
        match kind {
            ComponentKind::Database => {}
            ComponentKind::Api if analysis.needs_database() => {
                let db = ComponentKind::Database.as_str();
                spec = spec.depends_on(if analysis.api_depends_on_database {
                    DependencyEdge::required(db)
                } else {
                    DependencyEdge::optional(db)
                });
            }
            ComponentKind::Frontend if analysis.has_api => {
                let api = ComponentKind::Api.as_str();
                spec = spec.depends_on(if analysis.frontend_depends_on_api {
                    DependencyEdge::required(api)
                } else {
                    DependencyEdge::optional(api)
                });
            }
            _ => {}
        }
        components.insert(kind.as_str().to_string(), spec);
    }

    components
}

/// Caller config with defaults filled for absent keys
pub fn config_with_defaults(analysis: &RepoAnalysis, kind: ComponentKind) -> ComponentConfig {
    let mut config = analysis.config_for(kind).cloned().unwrap_or_default();
    for (key, value) in default_config(analysis, kind) {
        config.entry(key).or_insert(value);
    }
    config
}

fn default_config(analysis: &RepoAnalysis, kind: ComponentKind) -> ComponentConfig {
    let defaults = match kind {
        ComponentKind::Frontend => json!({
            "build_command": "npm run build",
            "output_dir": "build",
            "port": 3000,
            "health_check_path": "/",
        }),
        ComponentKind::Api => json!({
            "port": 8000,
            "health_check_path": DEFAULT_API_HEALTH_PATH,
            "e2e_path": DEFAULT_E2E_PATH,
            "start_command": default_start_command(analysis),
        }),
        ComponentKind::Database => json!({
            "engine": "postgres",
            "port": 5432,
            "database_name": analysis.app_name,
        }),
    };

    match defaults {
        Value::Object(map) => map,
        _ => ComponentConfig::new(),
    }
}

fn default_start_command(analysis: &RepoAnalysis) -> &'static str {
    let stack = analysis.primary_stack.to_lowercase();
    if PYTHON_STACKS.iter().any(|s| stack.contains(s)) {
        "uvicorn main:app --host 0.0.0.0 --port 8000"
    } else {
        "npm start"
    }
}
