//! Google Analytics Reporting MCP Server
//!
//! Bridges the Google Analytics Reporting API v4 to the Model Context Protocol.

mod auth;
mod config;
mod debug;
mod error;
mod flatten;
mod reporting;
mod request;
mod server;
mod service;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::debug::DebugLogger;
use crate::server::GaReportingServer;
use crate::service::AnalyticsService;

#[derive(Parser, Debug)]
#[command(name = "ga-reporting-mcp")]
#[command(author, version, about = "Google Analytics Reporting MCP Server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Enable debug mode (logs all tool calls to a trace file)
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    let debug_enabled = args.debug || config.debug;

    // stdout carries the MCP protocol, so logs go to stderr
    let default_level = if debug_enabled { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let debug = Arc::new(DebugLogger::new(debug_enabled));

    tracing::info!(config = %args.config, "Google Analytics Reporting MCP Server starting");
    tracing::debug!(
        key_file = %config.key_file.display(),
        endpoint = %config.batch_get_url(),
        default_view_id = config.default_view_id.as_deref().unwrap_or("N/A"),
        "Configuration loaded"
    );
    if let Some(path) = debug.trace_path() {
        tracing::info!(path = %path.display(), "Trace file");
    }

    let service = AnalyticsService::from_config(&config)
        .context("Failed to initialize the reporting client")?;

    let server = GaReportingServer::new(service, config.default_view_id.clone(), debug.clone());

    tracing::debug!("Starting MCP server on stdio transport...");

    // Run MCP server on stdio transport
    let running = server.serve(stdio()).await?;

    debug.log("MCP server started, waiting for messages...");

    // Wait for the service to complete
    running.waiting().await?;

    tracing::info!("MCP server shutting down");

    Ok(())
}
