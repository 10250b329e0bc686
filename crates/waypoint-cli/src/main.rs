//! Waypoint - tracking incident investigation from the terminal
//!
//! - `waypoint investigate` runs one investigation and prints the outcome
//! - `waypoint plan` shows which collectors run for a transport mode
//!
//! Logs go to stderr; stdout carries only results (or JSON-line events).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use waypoint_core::ai::{AiClientConfig, AnthropicClient, AuthHeader, LanguageModel, UnavailableModel};
use waypoint_core::collectors::replay::load_fixtures;
use waypoint_core::{
    plan_waves, CollectorRegistry, InvestigationConfig, InvestigationError, Investigator,
    InvestigatorServices, TransportMode,
};

mod render;

/// Waypoint - tracking incident investigator
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Investigate shipment tracking incidents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an investigation for an issue report
    ///
    /// Identifiers are extracted from the issue text by the language model
    /// (WAYPOINT_API_KEY, optional WAYPOINT_MODEL, WAYPOINT_BASE_URL and
    /// WAYPOINT_AUTH=bearer) unless given explicitly with --id.
    Investigate {
        /// Free-text issue report
        #[arg(long)]
        issue: String,

        /// Identifier as kind=value (repeatable), bypasses extraction
        #[arg(long = "id", value_parser = parse_key_val)]
        ids: Vec<(String, String)>,

        /// JSON file of recorded collector outputs to replay
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Config file (defaults to ~/.waypoint/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print events as JSON lines while the investigation runs
        #[arg(long)]
        events: bool,
    },

    /// Show the collection waves for a transport mode
    Plan {
        /// ocean, over_the_road, air, rail or unknown
        #[arg(long, default_value = "unknown")]
        mode: String,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected kind=value, got '{}'", s))?;
    if key.trim().is_empty() || value.trim().is_empty() {
        return Err(format!("expected kind=value, got '{}'", s));
    }
    Ok((key.trim().to_string(), value.trim().to_string()))
}

/// Model client from the environment, or a stand-in that always fails.
fn model_from_env() -> Result<Arc<dyn LanguageModel>> {
    let Ok(api_key) = std::env::var("WAYPOINT_API_KEY") else {
        tracing::info!("WAYPOINT_API_KEY not set, identifier extraction disabled");
        return Ok(Arc::new(UnavailableModel));
    };

    let mut config = AiClientConfig::default();
    if let Ok(model) = std::env::var("WAYPOINT_MODEL") {
        config.model = model;
    }
    config.base_url = std::env::var("WAYPOINT_BASE_URL").ok();
    config.auth_header = auth_header(std::env::var("WAYPOINT_AUTH").ok().as_deref())?;

    Ok(Arc::new(AnthropicClient::new(config, api_key)?))
}

/// Header style for the API key; `x-api-key` unless overridden.
fn auth_header(value: Option<&str>) -> Result<AuthHeader> {
    match value {
        None => Ok(AuthHeader::default()),
        Some(value) => value
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .context("Invalid WAYPOINT_AUTH"),
    }
}

fn build_registry(fixtures: Option<&PathBuf>, config: &InvestigationConfig) -> Result<CollectorRegistry> {
    let mut registry = CollectorRegistry::new().with_default_timeout(config.collector_timeout());
    if let Some(path) = fixtures {
        for collector in load_fixtures(path)? {
            registry.register(Arc::new(collector));
        }
        tracing::info!(collectors = registry.len(), "Loaded replay collectors");
    }
    Ok(registry)
}

async fn investigate(
    issue: String,
    ids: Vec<(String, String)>,
    fixtures: Option<PathBuf>,
    config_path: Option<PathBuf>,
    stream_events: bool,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => InvestigationConfig::load(path)?,
        None => InvestigationConfig::load_default()?,
    };

    let services = InvestigatorServices {
        model: model_from_env()?,
        registry: Arc::new(build_registry(fixtures.as_ref(), &config)?),
    };
    let investigator = Investigator::new(services, config)?;
    let manual: BTreeMap<String, String> = ids.into_iter().collect();

    let state = if stream_events {
        let (mut events, handle) = investigator.run_streaming(issue, manual);
        while let Some(event) = events.recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        handle
            .await
            .map_err(|e| InvestigationError::TaskFailed(e.to_string()))??
    } else {
        investigator.run(&issue, &manual).await?
    };

    if !stream_events {
        println!("{}", render::render_outcome(&state));
    }
    Ok(())
}

fn plan(mode: &str) -> Result<()> {
    let mode: TransportMode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    for wave in plan_waves(mode) {
        println!("{}", render::render_wave(&wave));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Investigate {
            issue,
            ids,
            fixtures,
            config,
            events,
        } => investigate(issue, ids, fixtures, config, events)
            .await
            .context("Investigation failed"),
        Commands::Plan { mode } => plan(&mode),
    }
}
