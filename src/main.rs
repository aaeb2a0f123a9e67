//! `mylm` - A globally available, high-performance terminal AI assistant
//!
//! This binary provides a CLI interface for the cognitive orchestration
//! engine (`mylm_core::brain`): a query typed at the prompt is perceived,
//! reasoned over by the typed agent suite, critiqued, checked for
//! coherence, gated, and synthesized into a final answer.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;

use mylm_core::brain::context::WorkingMemoryRegistry;
use mylm_core::brain::embedder::HashEmbedder;
use mylm_core::brain::llm::MockLlmGateway;
use mylm_core::brain::memory::{MemoryConfig, MemoryStore};
use mylm_core::brain::neuromodulation::NeuromodulationController;
use mylm_core::brain::orchestrator::{CancelToken, Orchestrator, QueryRequest};

use crate::cli::{Cli, Commands};
use crate::config::{find_config_file, Config};

mod cli;
mod config;

/// Main entry point for the AI assistant CLI
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    // Load configuration; a missing/invalid config file is fatal at startup
    // A missing/invalid config file is fatal at startup.
    let _config = Config::load().context("Failed to load configuration")?;

    let blue = Style::new().blue();

    match &cli.command {
        Some(Commands::Config) | Some(Commands::Setup) => {
            // Persona loading / installer wizards are out of core scope

            let path = find_config_file().map(|p| p.display().to_string()).unwrap_or_else(|| "~/.config/mylm/mylm.yaml".to_string());
            println!(
                "{} Config/Setup menus are not available in this build; edit {} directly.",
                blue.apply_to("mylm"),
                path,
            );
        }
        None => {
            let query = cli.query.join(" ");
            if query.trim().is_empty() {
                println!("Usage: mylm <query>");
                return Ok(());
            }
            run_query(&query).await?;
        }
    }

    Ok(())
}

/// Exercises the core pipeline end to end against the offline mock gateway
/// (`LLM_PROVIDER=mock` is the default: no network, no real model).
async fn run_query(query: &str) -> Result<()> {
    let gateway = Arc::new(MockLlmGateway);
    let embedder = Arc::new(HashEmbedder::new());
    let memory = Arc::new(MemoryStore::new(embedder.clone(), MemoryConfig::default()));
    let wm_registry = Arc::new(WorkingMemoryRegistry::new(7));
    let neuromodulation = Arc::new(NeuromodulationController::new());

    let orchestrator = Orchestrator::new(gateway, embedder, memory, wm_registry, neuromodulation);
    let request = QueryRequest {
        text: query.to_string(),
        ..QueryRequest::default()
    };
    let cancel = CancelToken::new();

    let result = orchestrator
        .process(request, &cancel)
        .await
        .context("query processing failed")?;

    println!("{}", result.final_answer);
    println!(
        "\n(quality={:.2}, coherence={:.2}, iterations={})",
        result.quality_score,
        result.coherence_score,
        result.iteration_trace.len()
    );
    if !result.quarantine.is_empty() {
        println!("{} item(s) quarantined by gating:", result.quarantine.len());
        for item in &result.quarantine {
            println!("  - {:?}: {}", item.agent, item.reason);
        }
    }

    Ok(())
}
