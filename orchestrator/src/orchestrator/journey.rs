//! End-to-end user journey through frontend, api and database

use chrono::Utc;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::result::{E2eTestResult, JourneyStep};
use crate::probe::http::join_url;
use crate::probe::{HttpReply, JourneyClient};
use crate::utils::elapsed_ms;

/// Shortest body accepted as a rendered page
const MIN_HTML_BYTES: usize = 50;

const HTML_MARKERS: [&str; 5] = ["<html", "<!doctype", "<div", "<body", "<head"];

/// Endpoints exercised by the journey; absent components are skipped
#[derive(Debug, Clone, Default)]
pub struct JourneyTargets {
    pub frontend_url: Option<String>,
    pub api_endpoint: Option<String>,
    pub database_endpoint: Option<String>,
    pub api_health_path: String,
    pub e2e_path: String,
}

/// Run the journey; the first failing step ends it
pub async fn run_journey(
    client: &dyn JourneyClient,
    targets: &JourneyTargets,
    mandatory: bool,
) -> E2eTestResult {
    let start = Instant::now();
    let mut steps: Vec<JourneyStep> = Vec::new();
    let mut record_id = None;

    let error = walk(client, targets, &mut steps, &mut record_id).await.err();
    let response_time_ms = elapsed_ms(start);

    let cleanup_performed = match (&record_id, &targets.api_endpoint) {
        (Some(id), Some(api)) => cleanup(client, api, &targets.e2e_path, id).await,
        _ => false,
    };

    match &error {
        None => info!("End-to-end journey passed in {} ms", response_time_ms),
        Some(e) => warn!("End-to-end journey failed: {}", e),
    }

    E2eTestResult {
        success: error.is_none(),
        mandatory,
        steps,
        response_time_ms,
        error,
        synthetic_record_id: record_id,
        cleanup_performed,
    }
}

async fn walk(
    client: &dyn JourneyClient,
    targets: &JourneyTargets,
    steps: &mut Vec<JourneyStep>,
    record_id: &mut Option<String>,
) -> Result<(), String> {
    if let Some(url) = &targets.frontend_url {
        let step = match client.get(url).await {
            Ok(reply) if reply.code() == 200 && looks_like_html(&reply.body) => {
                passed("frontend", &reply)
            }
            Ok(reply) => failed(
                "frontend",
                Some(&reply),
                format!("frontend not accessible: {} returned {}", url, reply.status),
            ),
            Err(e) => failed("frontend", None, format!("frontend not accessible: {}", e)),
        };
        push(steps, step)?;
    }

    if let Some(api) = &targets.api_endpoint {
        let url = join_url(api, &targets.api_health_path);
        let step = match client.get(&url).await {
            Ok(reply) if matches!(reply.code(), 200 | 201 | 404) => passed("api_health", &reply),
            Ok(reply) => failed(
                "api_health",
                Some(&reply),
                format!("api health check {} returned {}", url, reply.status),
            ),
            Err(e) => failed("api_health", None, format!("api unreachable: {}", e)),
        };
        push(steps, step)?;
    }

    if let Some(database) = &targets.database_endpoint {
        let start = Instant::now();
        let outcome = client.database_round_trip(database).await;
        let mut step = JourneyStep {
            name: "database".to_string(),
            success: matches!(outcome, Ok(true)),
            status_code: None,
            latency_ms: elapsed_ms(start),
            detail: None,
        };
        step.detail = match outcome {
            Ok(true) => None,
            Ok(false) => Some("database write-then-read probe failed".to_string()),
            Err(e) => Some(format!("database unreachable: {}", e)),
        };
        push(steps, step)?;
    }

    if let (Some(api), Some(_)) = (&targets.api_endpoint, &targets.database_endpoint) {
        let url = join_url(api, &targets.e2e_path);
        let payload = synthetic_payload();
        let step = match client.post_json(&url, &payload).await {
            Ok(reply) if matches!(reply.code(), 200 | 201) => {
                *record_id = record_id_of(&reply.body);
                passed("full_flow", &reply)
            }
            Ok(reply) if reply.code() == 404 => passed("full_flow", &reply),
            Ok(reply) => failed(
                "full_flow",
                Some(&reply),
                format!("create-record request {} returned {}", url, reply.status),
            ),
            Err(e) => failed("full_flow", None, format!("create-record request failed: {}", e)),
        };
        push(steps, step)?;
    }

    Ok(())
}

/// Best effort; never fails the journey
async fn cleanup(client: &dyn JourneyClient, api: &str, e2e_path: &str, id: &str) -> bool {
    let url = join_url(&join_url(api, e2e_path), id);
    match client.delete(&url).await {
        Ok(reply) if reply.status.is_success() => {
            debug!("Removed synthetic record {}", id);
            true
        }
        Ok(reply) => {
            warn!("Cleanup of synthetic record {} returned {}", id, reply.status);
            false
        }
        Err(e) => {
            warn!("Cleanup of synthetic record {} failed: {}", id, e);
            false
        }
    }
}

fn push(steps: &mut Vec<JourneyStep>, step: JourneyStep) -> Result<(), String> {
    let error = (!step.success).then(|| {
        step.detail
            .clone()
            .unwrap_or_else(|| format!("{} step failed", step.name))
    });
    debug!("Journey step {}: success={}", step.name, step.success);
    steps.push(step);
    error.map_or(Ok(()), Err)
}

fn passed(name: &str, reply: &HttpReply) -> JourneyStep {
    JourneyStep {
        name: name.to_string(),
        success: true,
        status_code: Some(reply.code()),
        latency_ms: reply.latency.as_millis() as u64,
        detail: None,
    }
}

fn failed(name: &str, reply: Option<&HttpReply>, detail: String) -> JourneyStep {
    JourneyStep {
        name: name.to_string(),
        success: false,
        status_code: reply.map(|r| r.code()),
        latency_ms: reply.map_or(0, |r| r.latency.as_millis() as u64),
        detail: Some(detail),
    }
}

/// Non-trivial body containing a recognizable markup tag
pub fn looks_like_html(body: &str) -> bool {
    if body.len() < MIN_HTML_BYTES {
        return false;
    }
    let lower = body.to_lowercase();
    HTML_MARKERS.iter().any(|m| lower.contains(m))
}

fn synthetic_payload() -> Value {
    let now = Utc::now();
    json!({
        "name": format!("e2e-{}", now.timestamp_millis()),
        "synthetic": true,
        "source": "codeflow-e2e",
        "created_at": now.to_rfc3339(),
    })
}

/// `id` of a created record, string or number
fn record_id_of(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
