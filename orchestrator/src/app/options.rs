//! Orchestrator runtime options

use std::time::Duration;

use crate::orchestrator::fsm::FsmSettings;
use crate::utils::CooldownOptions;

/// Main orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Phase machine settings
    pub fsm_settings: FsmSettings,

    /// How long INTEGRATION keeps re-probing an unhealthy component
    pub health_wait_timeout: Duration,

    /// Backoff between health probes
    pub health_backoff: CooldownOptions,

    /// Tear down deployed components when a later phase fails
    pub rollback_on_failure: bool,

    /// Health-check URL reported when neither frontend nor api was deployed
    pub health_check_placeholder: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            fsm_settings: FsmSettings::default(),
            health_wait_timeout: Duration::from_secs(120),
            health_backoff: CooldownOptions {
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(15),
                multiplier: 2.0,
            },
            rollback_on_failure: true,
            health_check_placeholder: "http://localhost/health".to_string(),
        }
    }
}

impl OrchestratorOptions {
    pub fn phase_timeout(&self) -> Duration {
        self.fsm_settings.phase_timeout
    }
}
