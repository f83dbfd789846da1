//! Blue/green deployment models

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::result::FullStackDeployment;

/// How traffic moves from blue to green
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrafficShiftStrategy {
    /// Switch all traffic at once
    Immediate,

    /// Stepped percentage increase
    Gradual {
        step_percent: u8,
        #[serde(with = "duration_secs")]
        step_interval: Duration,
    },

    /// Small fixed share held for an observation window before full cutover
    Canary {
        percent: u8,
        #[serde(with = "duration_secs")]
        observation: Duration,
    },
}

impl TrafficShiftStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            TrafficShiftStrategy::Immediate => "immediate",
            TrafficShiftStrategy::Gradual { .. } => "gradual",
            TrafficShiftStrategy::Canary { .. } => "canary",
        }
    }
}

impl Default for TrafficShiftStrategy {
    fn default() -> Self {
        TrafficShiftStrategy::Gradual {
            step_percent: 25,
            step_interval: Duration::from_secs(60),
        }
    }
}

/// Share of traffic routed to each environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSplit {
    /// Serving (blue) deployment; absent on a first deployment
    pub blue_deployment_id: Option<String>,
    pub green_deployment_id: String,
    pub green_percent: u8,
}

impl TrafficSplit {
    pub fn blue_percent(&self) -> u8 {
        100 - self.green_percent.min(100)
    }

    pub fn all_blue(blue: Option<String>, green: impl Into<String>) -> Self {
        Self {
            blue_deployment_id: blue,
            green_deployment_id: green.into(),
            green_percent: 0,
        }
    }
}

/// Health sample of green during the shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    /// Fraction of failed requests, 0.0 to 1.0
    pub error_rate: f64,
    pub response_time_ms: u64,
    #[serde(default)]
    pub green_percent: u8,
    pub sampled_at: DateTime<Utc>,
}

impl TrafficSample {
    pub fn new(error_rate: f64, response_time: Duration) -> Self {
        Self {
            error_rate,
            response_time_ms: response_time.as_millis() as u64,
            green_percent: 0,
            sampled_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueGreenStatus {
    Shifting,
    Completed,
    RolledBack,
    /// Routing back to blue failed; green may still take traffic
    RollbackFailed,
    Failed,
}

impl BlueGreenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlueGreenStatus::Shifting => "shifting",
            BlueGreenStatus::Completed => "completed",
            BlueGreenStatus::RolledBack => "rolled_back",
            BlueGreenStatus::RollbackFailed => "rollback_failed",
            BlueGreenStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BlueGreenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a blue/green deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueGreenDeployment {
    pub blue_deployment_id: Option<String>,
    pub green: FullStackDeployment,
    pub strategy: String,
    pub status: BlueGreenStatus,
    pub final_split: TrafficSplit,
    pub rollback_performed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<String>,

    #[serde(default)]
    pub samples: Vec<TrafficSample>,
}

impl BlueGreenDeployment {
    pub fn success(&self) -> bool {
        self.status == BlueGreenStatus::Completed
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
