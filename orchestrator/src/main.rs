//! CodeFlow Orchestrator - Entry Point
//!
//! Plans, deploys, inspects and rolls back full-stack deployments.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::{error, info};

use codeflow_orchestrator::blue_green::{BlueGreenOrchestrator, InMemoryRouter, ProbeTrafficMonitor};
use codeflow_orchestrator::filesys::dir::Dir;
use codeflow_orchestrator::filesys::file::File;
use codeflow_orchestrator::logs::init_logging;
use codeflow_orchestrator::models::analysis::{ComponentKind, RepoAnalysis};
use codeflow_orchestrator::models::state::{DeploymentFilter, DeploymentStatus};
use codeflow_orchestrator::orchestrator::{DeploymentPlan, StackOrchestrator};
use codeflow_orchestrator::probe::HttpProbeClient;
use codeflow_orchestrator::provision::{FixedEndpointProvisioner, ProvisionerSet};
use codeflow_orchestrator::storage::settings::Settings;
use codeflow_orchestrator::store::FileStateStore;
use codeflow_orchestrator::utils::version_info;

const DEFAULT_SETTINGS_FILE: &str = "codeflow.json";
const DEFAULT_LIST_LIMIT: usize = 20;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
        }
        return;
    }

    if let Err(e) = run(&cli_args).await {
        error!("{:#}", e);
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    let settings = load_settings(cli_args).await?;

    // Initialize logging; the guard flushes file logs on exit
    let _guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    if cli_args.contains_key("plan") {
        let analysis = read_analysis(cli_args).await?;
        let plan = DeploymentPlan::from_analysis(&analysis).context("Invalid analysis")?;
        return print_json(&plan);
    }

    let stack = Arc::new(build_stack(&settings).await?);

    if cli_args.contains_key("deploy") {
        let analysis = read_analysis(cli_args).await?;

        if cli_args.contains_key("blue-green") {
            let probe = Arc::new(HttpProbeClient::new(settings.probe_timeout())?);
            let blue_green = BlueGreenOrchestrator::new(
                stack.clone(),
                Arc::new(InMemoryRouter::new()),
                Arc::new(ProbeTrafficMonitor::new(
                    probe,
                    settings.blue_green.monitor_probes,
                )),
                settings.blue_green_config(),
            );
            let outcome = blue_green
                .deploy(&analysis, cli_args.get("blue").cloned())
                .await;
            print_json(&outcome)?;
            return verdict(outcome.success(), &format!("blue/green {}", outcome.status));
        }

        let result = stack.deploy_full_stack_application(&analysis).await;
        print_json(&result)?;
        return verdict(
            result.success,
            result
                .error_message
                .as_deref()
                .unwrap_or("deployment completed"),
        );
    }

    if let Some(deployment_id) = cli_args.get("status") {
        let report = stack
            .get_deployment_status(deployment_id)
            .await
            .with_context(|| format!("Unable to read deployment {}", deployment_id))?;
        print_json(&report)?;
        return verdict(
            report.overall_healthy,
            &format!("{} is {}", deployment_id, report.state.status),
        );
    }

    if let Some(deployment_id) = cli_args.get("rollback") {
        let component = cli_args
            .get("component")
            .map(|c| c.parse::<ComponentKind>())
            .transpose()
            .map_err(|e| anyhow!(e))?;
        let report = stack
            .rollback(deployment_id, component)
            .await
            .with_context(|| format!("Unable to roll back {}", deployment_id))?;
        print_json(&report)?;
        return verdict(report.success(), &report.summary());
    }

    if let Some(green_id) = cli_args.get("rollback-traffic") {
        let probe = Arc::new(HttpProbeClient::new(settings.probe_timeout())?);
        let blue_green = BlueGreenOrchestrator::new(
            stack.clone(),
            Arc::new(InMemoryRouter::new()),
            Arc::new(ProbeTrafficMonitor::new(probe, settings.blue_green.monitor_probes)),
            settings.blue_green_config(),
        );
        let rolled_back = blue_green.rollback_deployment(green_id).await?;
        let message = if rolled_back {
            "traffic routed back to blue"
        } else {
            "already rolled back"
        };
        return verdict(true, message);
    }

    if cli_args.contains_key("list") {
        let filter = DeploymentFilter {
            status: cli_args
                .get("status-filter")
                .map(|s| s.parse::<DeploymentStatus>())
                .transpose()
                .map_err(|e| anyhow!(e))?,
            stack_type: cli_args.get("stack-type").cloned(),
        };
        let limit = match cli_args.get("limit") {
            Some(limit) => limit
                .parse::<usize>()
                .with_context(|| format!("Invalid limit: {}", limit))?,
            None => DEFAULT_LIST_LIMIT,
        };

        for state in stack.list_deployments(&filter, limit).await? {
            let status = match state.status {
                DeploymentStatus::Completed => state.status.as_str().green(),
                DeploymentStatus::Failed => state.status.as_str().red(),
                _ => state.status.as_str().yellow(),
            };
            println!(
                "{}  {:<12}  {:<16}  {}",
                state.deployment_id,
                status,
                state.metadata_str("app_name").unwrap_or("-"),
                state.created_at.to_rfc3339()
            );
        }
        return Ok(());
    }

    Err(anyhow!(
        "No command given. Use --version, --plan, --deploy, --status=<id>, --rollback=<id>, --rollback-traffic=<id> or --list"
    ))
}

async fn load_settings(cli_args: &HashMap<String, String>) -> anyhow::Result<Settings> {
    match cli_args.get("settings") {
        Some(path) => Ok(Settings::load(&File::new(path)).await?),
        None => {
            let file = File::new(DEFAULT_SETTINGS_FILE);
            if file.exists().await {
                Ok(Settings::load(&file).await?)
            } else {
                Ok(Settings::default())
            }
        }
    }
}

async fn read_analysis(cli_args: &HashMap<String, String>) -> anyhow::Result<RepoAnalysis> {
    let path = cli_args
        .get("analysis")
        .ok_or_else(|| anyhow!("--analysis=<file> is required"))?;
    File::new(path)
        .read_json::<RepoAnalysis>()
        .await
        .with_context(|| format!("Unable to read analysis file {}", path))
}

async fn build_stack(settings: &Settings) -> anyhow::Result<StackOrchestrator> {
    let store = FileStateStore::open(Dir::new(&settings.state_dir))
        .await
        .with_context(|| format!("Unable to open state directory {}", settings.state_dir))?;
    let client = Arc::new(HttpProbeClient::new(settings.probe_timeout())?);

    let endpoints = &settings.endpoints;
    let mut database =
        FixedEndpointProvisioner::new(ComponentKind::Database, endpoints.database_endpoint.clone());
    if let Some(connection_string) = &endpoints.database_connection_string {
        database = database.with_connection_string(connection_string);
    }
    let provisioners = ProvisionerSet::new()
        .with(Arc::new(database))
        .with(Arc::new(FixedEndpointProvisioner::new(
            ComponentKind::Api,
            endpoints.api_endpoint.clone(),
        )))
        .with(Arc::new(FixedEndpointProvisioner::new(
            ComponentKind::Frontend,
            endpoints.frontend_url.clone(),
        )));

    info!("Using state store at {}", settings.state_dir);
    Ok(StackOrchestrator::new(
        Arc::new(store),
        provisioners,
        client.clone(),
        client,
        settings.orchestrator_options(),
    ))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn verdict(success: bool, message: &str) -> anyhow::Result<()> {
    if success {
        println!("{} {}", "ok:".green().bold(), message);
        Ok(())
    } else {
        Err(anyhow!("{}", message.to_string()))
    }
}
