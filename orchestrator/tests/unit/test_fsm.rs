//! Phase machine unit tests

use codeflow_orchestrator::models::analysis::ComponentKind;
use codeflow_orchestrator::models::result::DeploymentPhase;
use codeflow_orchestrator::orchestrator::fsm::{PhaseEvent, PhaseMachine};

fn fail(message: &str) -> PhaseEvent {
    PhaseEvent::Fail {
        error: message.to_string(),
        component: None,
    }
}

#[test]
fn test_fsm_initial_state() {
    let fsm = PhaseMachine::new();
    assert_eq!(fsm.phase(), DeploymentPhase::Planning);
    assert!(fsm.error().is_none());
    assert!(fsm.failed_in().is_none());
    assert!(fsm.durations().is_empty());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = PhaseMachine::new();

    // Planning -> Infrastructure -> Backend
    fsm.process(PhaseEvent::Advance).unwrap();
    assert_eq!(fsm.phase(), DeploymentPhase::Infrastructure);
    fsm.process(PhaseEvent::Advance).unwrap();
    assert_eq!(fsm.phase(), DeploymentPhase::Backend);

    // Backend -> ... -> Completed
    while !fsm.phase().is_terminal() {
        fsm.process(PhaseEvent::Advance).unwrap();
    }
    assert_eq!(fsm.phase(), DeploymentPhase::Completed);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_failure_from_planning() {
    let mut fsm = PhaseMachine::new();
    fsm.process(fail("cyclic dependency")).unwrap();

    assert_eq!(fsm.phase(), DeploymentPhase::Failed);
    assert_eq!(fsm.failed_in(), Some(DeploymentPhase::Planning));
    assert_eq!(fsm.error(), Some("cyclic dependency"));
}

#[test]
fn test_fsm_failure_names_component() {
    let mut fsm = PhaseMachine::new();
    for _ in 0..4 {
        fsm.process(PhaseEvent::Advance).unwrap();
    }
    assert_eq!(fsm.phase(), DeploymentPhase::Integration);

    fsm.process(PhaseEvent::Fail {
        error: "api unhealthy".to_string(),
        component: Some(ComponentKind::Api),
    })
    .unwrap();
    assert_eq!(fsm.failed_in(), Some(DeploymentPhase::Integration));
    assert_eq!(fsm.failed_component(), Some(ComponentKind::Api));
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = PhaseMachine::new();
    fsm.process(fail("first")).unwrap();

    // Failed is terminal
    assert!(fsm.process(PhaseEvent::Advance).is_err());
    assert!(fsm.process(fail("second")).is_err());
    assert_eq!(fsm.error(), Some("first"));
}
