///
/// This module implements the CLI interface for rag-ingest: command parsing, argument
/// validation and the async entrypoint.
///
/// All exporting, uploading and pipeline logic lives in [`rag-ingest-core`]. This module only
/// wires configuration into the core types and reports the outcome.
///
/// ## How To Use
/// - For command-line users: use the installed `rag-ingest` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`rag-ingest-core`]: ../../rag-ingest-core/
use crate::load_config::{load_config, CliConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_ingest_core::contract::{ExportManifest, Exporter};
use rag_ingest_core::export::DefaultExporter;
use rag_ingest_core::store::AnythingLlmClient;
use rag_ingest_core::synchronise::{file_names, synchronise, SyncReport};
use std::path::PathBuf;

/// CLI for rag-ingest: export ticket and wiki content and push it into a RAG workspace.
#[derive(Parser)]
#[clap(
    name = "rag-ingest",
    version,
    about = "Export Redmine and Wiki.js content as markdown and push it into an AnythingLLM workspace"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export all sources, then upload, attach and embed the exported files
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Export all sources to markdown without touching the store
    Export {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Push files left by a previous export, without exporting again
    Push {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Print the route table resolved against the store as JSON
    Routes {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let config = load_config(config)?;
            config.require_source_tokens()?;
            let client = connect(&config).await?;
            tracing::info!(command = "sync", "Starting synchronisation process");
            let manifest = export(&config).await?;
            let report = synchronise(&client, &manifest).await;
            log_report("sync", &report);
            Ok(())
        }
        Commands::Export { config } => {
            let config = load_config(config)?;
            config.require_source_tokens()?;
            let manifest = export(&config).await?;
            tracing::info!(
                command = "export",
                sources = manifest.sources.len(),
                files_exported = manifest.file_count(),
                "Export complete"
            );
            Ok(())
        }
        Commands::Push { config } => {
            let config = load_config(config)?;
            let client = connect(&config).await?;
            let manifest = ExportManifest::scan(&config.export)
                .context("Failed to read previous export")?;
            let report = synchronise(&client, &manifest).await;
            log_report("push", &report);
            Ok(())
        }
        Commands::Routes { config } => {
            let config = load_config(config)?;
            let client = connect(&config).await?;
            let json = serde_json::to_string_pretty(client.routes())
                .context("Failed to serialise route table")?;
            println!("{json}");
            Ok(())
        }
    }
}

async fn connect(config: &CliConfig) -> Result<AnythingLlmClient> {
    let settings = config.store_settings()?;
    AnythingLlmClient::connect(&settings)
        .await
        .context("Failed to construct document store client")
}

async fn export(config: &CliConfig) -> Result<ExportManifest> {
    let exporter = DefaultExporter::new(config.export.clone());
    exporter.export_all().await.context("Export failed")
}

fn log_report(command: &str, report: &SyncReport) {
    let Some(push) = &report.push else {
        tracing::info!(command, files_exported = 0, "Nothing exported, store untouched");
        return;
    };
    if !push.failed.is_empty() {
        tracing::warn!(command, failed = ?file_names(&push.failed), "Some files were not uploaded");
    }
    tracing::info!(
        command,
        files_exported = report.files_exported,
        documents_uploaded = push.documents_uploaded,
        files_failed = push.failed.len(),
        ambiguous = push.ambiguous,
        documents_attached = push.documents_attached,
        embed_requested = push.embed_requested,
        documents_visible = push.documents_visible,
        "Synchronisation complete"
    );
}
