//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::options::OrchestratorOptions;
use crate::blue_green::BlueGreenConfig;
use crate::errors::OrchestratorError;
use crate::filesys::file::File;
use crate::logs::{LogLevel, LogOptions};
use crate::models::blue_green::TrafficShiftStrategy;
use crate::orchestrator::fsm::FsmSettings;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Directory of the file-backed state store
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Upper bound for a single deployment phase, in seconds
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout_secs: u64,

    /// How long to wait for components to turn healthy, in seconds
    #[serde(default = "default_health_wait")]
    pub health_wait_timeout_secs: u64,

    /// Timeout of a single health probe, in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Tear down deployed components when a later phase fails
    #[serde(default = "default_true")]
    pub rollback_on_failure: bool,

    /// Blue/green configuration
    #[serde(default)]
    pub blue_green: BlueGreenSettings,

    /// Already-running component endpoints adopted by `--deploy`
    #[serde(default)]
    pub endpoints: EndpointSettings,
}

fn default_true() -> bool {
    true
}

fn default_state_dir() -> String {
    ".codeflow/deployments".to_string()
}

fn default_phase_timeout() -> u64 {
    900
}

fn default_health_wait() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            state_dir: default_state_dir(),
            phase_timeout_secs: default_phase_timeout(),
            health_wait_timeout_secs: default_health_wait(),
            probe_timeout_secs: default_probe_timeout(),
            rollback_on_failure: true,
            blue_green: BlueGreenSettings::default(),
            endpoints: EndpointSettings::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(file: &File) -> Result<Self, OrchestratorError> {
        file.read_json::<Settings>().await.map_err(|e| {
            OrchestratorError::ConfigError(format!(
                "Unable to read settings file {}: {}",
                file.path().display(),
                e
            ))
        })
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            json_format: self.log_json,
            log_dir: self.log_dir.as_ref().map(PathBuf::from),
            ..Default::default()
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            fsm_settings: FsmSettings {
                phase_timeout: Duration::from_secs(self.phase_timeout_secs),
            },
            health_wait_timeout: Duration::from_secs(self.health_wait_timeout_secs),
            rollback_on_failure: self.rollback_on_failure,
            ..Default::default()
        }
    }

    pub fn blue_green_config(&self) -> BlueGreenConfig {
        let bg = &self.blue_green;
        BlueGreenConfig {
            strategy: bg.strategy.clone(),
            max_error_rate: bg.max_error_rate,
            max_response_time: Duration::from_millis(bg.max_response_time_ms),
            rollback_threshold: Duration::from_secs(bg.rollback_threshold_minutes * 60),
            sample_interval: Duration::from_secs(bg.sample_interval_secs),
            require_e2e_validation: bg.require_e2e_validation,
            teardown_green_on_rollback: bg.teardown_green_on_rollback,
        }
    }
}

/// Blue/green settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueGreenSettings {
    /// Traffic shift strategy
    #[serde(default)]
    pub strategy: TrafficShiftStrategy,

    /// Highest tolerated green error rate, 0.0 to 1.0
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,

    #[serde(default = "default_max_response_time")]
    pub max_response_time_ms: u64,

    /// Window after which an unfinished shift is rolled back
    #[serde(default = "default_rollback_threshold")]
    pub rollback_threshold_minutes: u64,

    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Probes per traffic sample
    #[serde(default = "default_monitor_probes")]
    pub monitor_probes: u32,

    #[serde(default = "default_true")]
    pub require_e2e_validation: bool,

    #[serde(default = "default_true")]
    pub teardown_green_on_rollback: bool,
}

fn default_max_error_rate() -> f64 {
    0.05
}

fn default_max_response_time() -> u64 {
    2000
}

fn default_rollback_threshold() -> u64 {
    10
}

fn default_sample_interval() -> u64 {
    60
}

fn default_monitor_probes() -> u32 {
    5
}

impl Default for BlueGreenSettings {
    fn default() -> Self {
        Self {
            strategy: TrafficShiftStrategy::default(),
            max_error_rate: default_max_error_rate(),
            max_response_time_ms: default_max_response_time(),
            rollback_threshold_minutes: default_rollback_threshold(),
            sample_interval_secs: default_sample_interval(),
            monitor_probes: default_monitor_probes(),
            require_e2e_validation: true,
            teardown_green_on_rollback: true,
        }
    }
}

/// Endpoints of components that already run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointSettings {
    #[serde(default)]
    pub frontend_url: Option<String>,

    #[serde(default)]
    pub api_endpoint: Option<String>,

    #[serde(default)]
    pub database_endpoint: Option<String>,

    #[serde(default)]
    pub database_connection_string: Option<String>,
}
