//! Finite State Machine for full-stack deployment phases

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::analysis::ComponentKind;
use crate::models::result::DeploymentPhase;

/// Phase machine settings
#[derive(Debug, Clone)]
pub struct FsmSettings {
    /// Upper bound for a single phase
    pub phase_timeout: Duration,
}

impl Default for FsmSettings {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_secs(900),
        }
    }
}

/// Phase event
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    /// Current phase finished, move to the next one
    Advance,

    /// Current phase failed
    Fail {
        error: String,
        component: Option<ComponentKind>,
    },
}

/// Deployment phase FSM
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: DeploymentPhase,
    failed_in: Option<DeploymentPhase>,
    failed_component: Option<ComponentKind>,
    error: Option<String>,
    entered_at: Instant,
    durations: BTreeMap<DeploymentPhase, u64>,
}

impl PhaseMachine {
    /// Create a new FSM in planning phase
    pub fn new() -> Self {
        Self {
            phase: DeploymentPhase::Planning,
            failed_in: None,
            failed_component: None,
            error: None,
            entered_at: Instant::now(),
            durations: BTreeMap::new(),
        }
    }

    /// Get current phase
    pub fn phase(&self) -> DeploymentPhase {
        self.phase
    }

    /// Phase the failure happened in
    pub fn failed_in(&self) -> Option<DeploymentPhase> {
        self.failed_in
    }

    pub fn failed_component(&self) -> Option<ComponentKind> {
        self.failed_component
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Elapsed milliseconds per completed (or failed) phase
    pub fn durations(&self) -> &BTreeMap<DeploymentPhase, u64> {
        &self.durations
    }

    /// Process an event and transition phase
    pub fn process(&mut self, event: PhaseEvent) -> Result<DeploymentPhase, String> {
        let next = match (self.phase, &event) {
            (DeploymentPhase::Planning, PhaseEvent::Advance) => DeploymentPhase::Infrastructure,
            (DeploymentPhase::Infrastructure, PhaseEvent::Advance) => DeploymentPhase::Backend,
            (DeploymentPhase::Backend, PhaseEvent::Advance) => DeploymentPhase::Frontend,
            (DeploymentPhase::Frontend, PhaseEvent::Advance) => DeploymentPhase::Integration,
            (DeploymentPhase::Integration, PhaseEvent::Advance) => DeploymentPhase::Validation,
            (DeploymentPhase::Validation, PhaseEvent::Advance) => DeploymentPhase::Completed,

            (phase, PhaseEvent::Fail { error, component }) if !phase.is_terminal() => {
                self.failed_in = Some(phase);
                self.failed_component = *component;
                self.error = Some(error.clone());
                DeploymentPhase::Failed
            }

            // Invalid transitions
            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        let now = Instant::now();
        self.durations
            .insert(self.phase, now.duration_since(self.entered_at).as_millis() as u64);
        self.entered_at = now;
        self.phase = next;
        Ok(next)
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
