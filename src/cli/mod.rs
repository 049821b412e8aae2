//! # Command Line Interface
//!
//! `fleetplane serve` runs the control plane; `fleetplane check` compiles one
//! intent file offline and prints what its snapshot would contain.

pub mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::FleetIntent;
use crate::observability::{init_observability, log_config_info};
use crate::services::{ConfigManager, InMemoryValidationUpdater};
use crate::startup::run_control_plane;
use crate::xds::FleetSnapshotCache;
use crate::{APP_NAME, VERSION};
use output::{print_summary, OutputFormat, SnapshotSummary};

#[derive(Parser)]
#[command(name = "fleetplane")]
#[command(about = "Envoy control plane compiling routing intent into per-fleet xDS snapshots")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (YAML or TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level or filter directive override
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Intent directory override
    #[arg(long, global = true)]
    pub intent_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the discovery server and watch the intent directory (default)
    Serve,

    /// Compile one intent file without starting the server
    Check {
        /// Intent file to compile
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
}

impl Cli {
    fn app_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(directory) = &self.intent_dir {
            config.intent.directory = directory.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.app_config()?;

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Check { file, output }) => check(&config, &file, output),
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting fleetplane control plane");
    log_config_info(&config);

    run_control_plane(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    })
    .await?;

    info!("fleetplane control plane stopped");
    Ok(())
}

fn check(config: &AppConfig, file: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let summary = compile_intent_file(config, file)?;
    print_summary(&summary, format)
}

/// Build one intent file into a snapshot summary without applying it
pub fn compile_intent_file(config: &AppConfig, file: &Path) -> anyhow::Result<SnapshotSummary> {
    let document = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read intent file {}", file.display()))?;
    let intent = FleetIntent::from_yaml(&document)
        .with_context(|| format!("Invalid intent file {}", file.display()))?;

    let manager = ConfigManager::new(
        config,
        Arc::new(FleetSnapshotCache::default()),
        Arc::new(InMemoryValidationUpdater::new()),
    );
    let built = manager
        .build(&intent)
        .with_context(|| format!("Fleet {} does not compile", intent.fleet))?;

    Ok(SnapshotSummary::new(&intent.fleet.to_string(), &built))
}
