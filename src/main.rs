//! soap-dispatch command line.
//!
//! Loads a dispatch configuration and answers "which endpoint / which
//! operation would receive this request" questions, or keeps a dispatcher
//! live while the configuration file changes.
//!
//! ```text
//! config.toml ──► load + validate ──► Dispatcher::from_config
//!                                       │
//!          check ◄── summary ───────────┤
//!        resolve ◄── address table ─────┤
//!          route ◄── template table ────┤
//!          watch ◄── ConfigWatcher ──► DispatcherHandle::apply
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use soap_dispatch::config::{load_config, ConfigWatcher, DispatchConfig};
use soap_dispatch::observability::{logging, metrics};
use soap_dispatch::template::parse_query_string;
use soap_dispatch::{Dispatcher, DispatcherHandle, QualifiedName, RequestDescriptor};

#[derive(Parser)]
#[command(name = "soap-dispatch")]
#[command(about = "Inspect SOAP/HTTP endpoint dispatch tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration and build its tables
    Check { config: PathBuf },
    /// Resolve a destination address to endpoint names
    Resolve {
        config: PathBuf,
        /// Absolute destination URI
        #[arg(long)]
        to: String,
        /// Header present on the message, in `{namespace}local` form
        #[arg(long = "header")]
        headers: Vec<String>,
    },
    /// Route a request path and query to template operations
    Route {
        config: PathBuf,
        #[arg(long)]
        path: String,
        /// Raw query string, e.g. `id=5&format=xml`
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Keep a dispatcher live, reloading on configuration changes
    Watch { config: PathBuf },
}

impl Commands {
    fn config_path(&self) -> &Path {
        match self {
            Self::Check { config }
            | Self::Resolve { config, .. }
            | Self::Route { config, .. }
            | Self::Watch { config } => config,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "soap-dispatch failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.command.config_path())?;
    logging::init_logging(&config.logging);
    init_metrics(&config);

    let dispatcher = Dispatcher::from_config(&config)?;

    match cli.command {
        Commands::Check { .. } => print(&json!({
            "endpoints": dispatcher.addresses().len(),
            "candidate_sets": dispatcher.addresses().candidate_set_count(),
            "templates": dispatcher.templates().templates(),
            "template_groups": dispatcher.templates().group_count(),
        })),
        Commands::Resolve { to, headers, .. } => {
            let mut request = RequestDescriptor::from_uri(&to)?;
            for header in &headers {
                request = request.with_header(header.parse::<QualifiedName>()?);
            }
            print(&json!({ "to": to, "endpoints": dispatcher.resolve(&request) }))
        }
        Commands::Route { path, query, .. } => {
            let query = parse_query_string(&query);
            print(&json!({ "path": path, "matches": dispatcher.route(&path, &query) }))
        }
        Commands::Watch { config: path } => watch(&path, dispatcher).await,
    }
}

fn init_metrics(config: &DispatchConfig) {
    if !config.observability.metrics_enabled {
        return;
    }
    match config.observability.metrics_address.parse() {
        Ok(addr) => {
            if let Err(e) = metrics::init_metrics(addr) {
                tracing::error!(error = %e, "Failed to start metrics endpoint");
            }
        }
        Err(_) => tracing::error!(
            metrics_address = %config.observability.metrics_address,
            "Failed to parse metrics address"
        ),
    }
}

fn print(value: &serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn watch(path: &Path, dispatcher: Dispatcher) -> Result<(), Box<dyn std::error::Error>> {
    let handle = DispatcherHandle::new(dispatcher);
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let _watcher = watcher.run()?;

    loop {
        tokio::select! {
            Some(config) = updates.recv() => {
                if let Err(e) = handle.apply(&config) {
                    tracing::warn!(error = %e, "Reload rejected, keeping current dispatcher");
                    continue;
                }
                let current = handle.load();
                tracing::info!(
                    endpoints = current.addresses().len(),
                    templates = current.templates().len(),
                    "Configuration applied"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                return Ok(());
            }
        }
    }
}
