//! Dependency manager integration tests

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;

use codeflow_orchestrator::deps::{ComponentSpec, DependencyEdge, DependencyManager};
use codeflow_orchestrator::errors::OrchestratorError;
use codeflow_orchestrator::models::analysis::ComponentKind;
use codeflow_orchestrator::models::state::{DeploymentState, StateMutation};
use codeflow_orchestrator::store::{InMemoryStateStore, StateStore};

use crate::common::{full_stack_analysis, FakeProber};

fn scenario_components() -> IndexMap<String, ComponentSpec> {
    let mut components = IndexMap::new();
    components.insert(
        "frontend".to_string(),
        ComponentSpec::new(ComponentKind::Frontend).depends_on(DependencyEdge::required("api")),
    );
    components.insert(
        "api".to_string(),
        ComponentSpec::new(ComponentKind::Api).depends_on(DependencyEdge::required("database")),
    );
    components.insert(
        "database".to_string(),
        ComponentSpec::new(ComponentKind::Database),
    );
    components
}

async fn manager(id: &str) -> (DependencyManager, Arc<InMemoryStateStore>) {
    let store = Arc::new(InMemoryStateStore::new());
    store
        .create(DeploymentState::new(id, &full_stack_analysis()))
        .await
        .unwrap();
    let manager = DependencyManager::new(store.clone(), Arc::new(FakeProber::default()));
    (manager, store)
}

#[tokio::test]
async fn test_resolution_order_respects_every_edge() {
    let (manager, _store) = manager("dep-1").await;
    let graph = manager.build_graph("dep-1", scenario_components()).unwrap();
    let order = manager.resolution_order(&graph);

    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    for name in graph.names() {
        for edge in &graph.component(name).unwrap().depends_on {
            assert!(
                position(&edge.name) < position(name),
                "{} must come before {} in {:?}",
                edge.name,
                name,
                order
            );
        }
    }
    assert_eq!(order, vec!["database", "api", "frontend"]);
}

#[tokio::test]
async fn test_cycle_produces_no_graph() {
    let (manager, _store) = manager("dep-1").await;
    let mut components = scenario_components();
    components.insert(
        "database".to_string(),
        ComponentSpec::new(ComponentKind::Database).depends_on(DependencyEdge::required("frontend")),
    );

    let result = manager.build_graph("dep-1", components);
    match result {
        Err(OrchestratorError::CyclicDependency(cycle)) => {
            assert!(cycle.contains(&"database".to_string()));
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("expected a cycle, got {:?}", other.map(|g| g.len())),
    }
    assert!(manager.graph("dep-1").is_none());
}

#[tokio::test]
async fn test_api_without_database_endpoint_is_not_ready() {
    let (manager, _store) = manager("dep-1").await;
    manager.build_graph("dep-1", scenario_components()).unwrap();

    let result = manager.inject_configuration("dep-1", "api").await;
    assert!(matches!(
        result,
        Err(OrchestratorError::DependencyNotReady { ref component, ref dependency })
            if component == "api" && dependency == "database"
    ));
}

#[tokio::test]
async fn test_injection_follows_recorded_endpoints() {
    let (manager, store) = manager("dep-1").await;
    manager.build_graph("dep-1", scenario_components()).unwrap();

    store
        .update(
            "dep-1",
            1,
            StateMutation::new().resource(
                "database",
                json!({"kind": "database", "endpoint": "db.internal:5432"}),
            ),
        )
        .await
        .unwrap();
    let api = manager.inject_configuration("dep-1", "api").await.unwrap();
    // Without a connection string the endpoint doubles as the connection
    assert_eq!(api["database_connection"], "db.internal:5432");

    // The frontend still waits on the api
    assert!(manager.inject_configuration("dep-1", "frontend").await.is_err());

    store
        .update(
            "dep-1",
            2,
            StateMutation::new().resource(
                "api",
                json!({"kind": "api", "endpoint": "http://api.internal"}),
            ),
        )
        .await
        .unwrap();
    let frontend = manager.inject_configuration("dep-1", "frontend").await.unwrap();
    assert_eq!(frontend["api_endpoint"], "http://api.internal");
    assert!(!frontend.contains_key("database_endpoint"));
}

#[tokio::test]
async fn test_optional_edges_never_block() {
    let (manager, _store) = manager("dep-1").await;
    let mut components = IndexMap::new();
    components.insert("database".to_string(), ComponentSpec::new(ComponentKind::Database));
    components.insert(
        "api".to_string(),
        ComponentSpec::new(ComponentKind::Api).depends_on(DependencyEdge::optional("database")),
    );
    manager.build_graph("dep-1", components).unwrap();

    let config = manager.inject_configuration("dep-1", "api").await.unwrap();
    assert!(config.is_empty());
}
