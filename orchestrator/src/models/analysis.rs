//! Repository analysis models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form component configuration
pub type ComponentConfig = Map<String, Value>;

/// Kind of a stack component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Database,
    Api,
    Frontend,
}

impl ComponentKind {
    /// All kinds in deployment order
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Database,
        ComponentKind::Api,
        ComponentKind::Frontend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Database => "database",
            ComponentKind::Api => "api",
            ComponentKind::Frontend => "frontend",
        }
    }

    /// Tie-break priority during dependency resolution (lower deploys first)
    pub fn priority(&self) -> u8 {
        match self {
            ComponentKind::Database => 0,
            ComponentKind::Api => 1,
            ComponentKind::Frontend => 2,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "database" | "db" => Ok(ComponentKind::Database),
            "api" | "backend" => Ok(ComponentKind::Api),
            "frontend" | "web" => Ok(ComponentKind::Frontend),
            _ => Err(format!("Invalid component kind: {}", s)),
        }
    }
}

/// Stack composition produced by the repository classifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoAnalysis {
    pub app_name: String,

    #[serde(default)]
    pub repo_path: String,

    /// Classification labels
    #[serde(default)]
    pub stack_type: String,
    #[serde(default)]
    pub primary_stack: String,
    #[serde(default)]
    pub secondary_stacks: Vec<String>,

    #[serde(default)]
    pub has_frontend: bool,
    #[serde(default)]
    pub has_api: bool,
    #[serde(default)]
    pub has_database: bool,

    /// Dependency edges
    #[serde(default)]
    pub requires_database: bool,
    #[serde(default)]
    pub api_depends_on_database: bool,
    #[serde(default)]
    pub frontend_depends_on_api: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_config: Option<ComponentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_config: Option<ComponentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_config: Option<ComponentConfig>,
}

impl RepoAnalysis {
    /// Whether the stack includes a database component
    pub fn needs_database(&self) -> bool {
        self.has_database || self.requires_database
    }

    /// Whether the stack includes the given component
    pub fn includes(&self, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Database => self.needs_database(),
            ComponentKind::Api => self.has_api,
            ComponentKind::Frontend => self.has_frontend,
        }
    }

    /// Components present in the stack, in deployment order
    pub fn components(&self) -> Vec<ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .filter(|k| self.includes(*k))
            .collect()
    }

    /// Caller-supplied configuration for a component
    pub fn config_for(&self, kind: ComponentKind) -> Option<&ComponentConfig> {
        match kind {
            ComponentKind::Database => self.database_config.as_ref(),
            ComponentKind::Api => self.api_config.as_ref(),
            ComponentKind::Frontend => self.frontend_config.as_ref(),
        }
    }

    /// Whether the api + database pair makes end-to-end validation mandatory
    pub fn has_data_path(&self) -> bool {
        self.has_api && self.needs_database()
    }
}

/// Result of invoking a provisioning primitive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentDeployment {
    /// Public endpoint of the deployed component
    pub endpoint: String,

    /// Provider identifier used for teardown; defaults to the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Provider-specific connection details
    #[serde(default)]
    pub connection_info: Map<String, Value>,
}

impl ComponentDeployment {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            identifier: None,
            connection_info: Map::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_connection(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.connection_info.insert(key.to_string(), value.into());
        self
    }

    /// Identifier to hand back to the provisioner on teardown
    pub fn teardown_id(&self) -> &str {
        self.identifier.as_deref().unwrap_or(&self.endpoint)
    }
}
