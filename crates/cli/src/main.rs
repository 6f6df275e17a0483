//! `scenario-runner` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the REST API over an in-memory backed engine.
//! - `run`      — execute a scenario definition file on mock devices.
//! - `validate` — validate a scenario graph JSON file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use device::mock::{MockDriver, MockProvider};
use engine::{
    EngineConfig, ExecutionRegistry, ExecutionReport, ExecutionRequest, MediaCoordinator,
    ScenarioEngine,
};
use events::EventBus;
use store::{MemoryMediaStore, MemoryReportWriter, MemoryStore, ScenarioRecord};

#[derive(Parser)]
#[command(
    name = "scenario-runner",
    about = "Graph-based mobile UI scenario execution engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Scenario definition files to seed the in-memory store with;
        /// each file's stem becomes its scenario id.
        #[arg(long)]
        seed: Vec<PathBuf>,
        /// Mock device ids made available to executions.
        #[arg(long, default_value = "mock-1")]
        devices: String,
    },
    /// Execute a scenario definition file locally on mock devices.
    Run {
        /// Path to the scenario graph JSON file.
        path: PathBuf,
        /// Comma-separated device ids to run on.
        #[arg(long, default_value = "mock-1")]
        devices: String,
        /// Number of queue passes.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Validate a scenario graph JSON file.
    Validate {
        /// Path to the scenario graph JSON file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            seed,
            devices,
        } => {
            let store = Arc::new(MemoryStore::new());
            for path in &seed {
                let definition = read_definition(path)?;
                let id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "scenario".to_string());
                info!("seeding scenario '{id}' from {}", path.display());
                store.insert_scenario(ScenarioRecord {
                    id: id.clone(),
                    name: id,
                    package_id: None,
                    category_id: None,
                    definition,
                });
            }

            let engine = build_engine(store, &device_ids(&devices));
            let addr: SocketAddr = bind.parse().context("invalid bind address")?;
            info!("starting API server on {addr}");
            api::serve(engine, addr).await?;
        }
        Command::Run {
            path,
            devices,
            repeat,
        } => {
            let definition = read_definition(&path)?;
            engine::graph::parse_graph(&definition)
                .map_err(|e| anyhow::anyhow!("invalid scenario graph: {e}"))?;

            let store = Arc::new(MemoryStore::new());
            store.insert_scenario(ScenarioRecord {
                id: "local".into(),
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "local".to_string()),
                package_id: None,
                category_id: None,
                definition,
            });

            let ids = device_ids(&devices);
            let reports = Arc::new(MemoryReportWriter::new());
            let engine = build_engine_with_reports(store, &ids, reports.clone());

            let execution_id = engine
                .start(ExecutionRequest {
                    scenario_ids: vec!["local".into()],
                    device_ids: ids,
                    repeat_count: repeat,
                    interval_ms: None,
                })
                .await
                .map_err(|e| anyhow::anyhow!("could not start execution: {e}"))?;
            info!("execution {execution_id} started");

            // The run finalizes by leaving the registry.
            while engine.registry().lookup(execution_id).is_some() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            let report = reports
                .reports()
                .into_iter()
                .find(|r| r.execution_id == execution_id)
                .context("no report produced")?;
            let report: ExecutionReport = serde_json::from_value(report.payload)
                .context("malformed report payload")?;

            let mut any_failed = false;
            for (device_id, device) in &report.devices {
                for result in &device.results {
                    let mark = if result.passed { "✅" } else { "❌" };
                    println!(
                        "{mark} [{device_id}] {} (repeat {}): {}",
                        result.scenario_name,
                        result.repeat_index,
                        result.error.as_deref().unwrap_or("ok")
                    );
                    for step in &result.steps {
                        let branch = step
                            .condition_result
                            .map(|b| format!(" -> {}", if b { "yes" } else { "no" }))
                            .unwrap_or_default();
                        println!(
                            "    [{}] {}{branch}{}",
                            step.status.as_str(),
                            step.node_name,
                            step.error
                                .as_deref()
                                .map(|e| format!(" ({e})"))
                                .unwrap_or_default()
                        );
                    }
                    any_failed |= !result.passed;
                }
            }
            if any_failed {
                std::process::exit(1);
            }
        }
        Command::Validate { path } => {
            let definition = read_definition(&path)?;
            match engine::graph::parse_graph(&definition) {
                Ok(graph) => {
                    println!(
                        "✅ Scenario graph is valid: {} nodes, {} edges",
                        graph.nodes.len(),
                        graph.edges.len()
                    );
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn read_definition(path: &PathBuf) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid JSON")
}

fn device_ids(devices: &str) -> Vec<String> {
    devices
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_engine(store: Arc<MemoryStore>, devices: &[String]) -> Arc<ScenarioEngine> {
    build_engine_with_reports(store, devices, Arc::new(MemoryReportWriter::new()))
}

fn build_engine_with_reports(
    store: Arc<MemoryStore>,
    devices: &[String],
    reports: Arc<MemoryReportWriter>,
) -> Arc<ScenarioEngine> {
    let drivers = devices
        .iter()
        .map(|id| Arc::new(MockDriver::new(id.clone())))
        .collect();
    Arc::new(ScenarioEngine::new(
        Arc::new(ExecutionRegistry::new()),
        store,
        reports,
        Arc::new(MockProvider::new(drivers)),
        MediaCoordinator::new(Arc::new(MemoryMediaStore::new())),
        EventBus::new(),
        EngineConfig::default(),
    ))
}
