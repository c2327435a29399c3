//! Intercom Export - fetch conversations from the Intercom API and render
//! them as Markdown or JSON.
//!
//! Configuration merges four sources (defaults, YAML file, environment,
//! CLI flags); the API client retries rate-limited and transient failures
//! with bounded exponential backoff.

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{format_stats, render, resolve};
use cli::Cli;
use domain::{AppError, Config, ExportStats};
use infrastructure::{load_conversation_ids, load_layer, ApiClient, DEFAULT_IDS_FILE};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> domain::Result<()> {
    let file_layer = load_layer(&cli.config)?;
    let env: HashMap<String, String> = std::env::vars().collect();
    let config = resolve(file_layer, &env, cli.overrides()?)?;

    tracing::debug!(
        base_url = %config.intercom.base_url,
        batch_size = config.export.batch_size,
        format = %config.export.output_format,
        "Resolved configuration"
    );

    let ids = gather_ids(&cli)?;
    tracing::info!(count = ids.len(), "Exporting conversations");

    let mut client = ApiClient::new(config.clone())?;
    if let Some(secs) = cli.deadline_secs {
        client = client.with_deadline(Duration::from_secs(secs));
    }

    let conversations = if ids.len() == 1 {
        // Single-id runs take the direct path with its detail-GET fallback.
        vec![client.fetch_conversation(&ids[0]).await?]
    } else {
        match client.fetch_conversations(&ids).await {
            Ok(conversations) => conversations,
            Err(AppError::Cancelled { completed, total }) => {
                return salvage_partial(&cli, &config, completed, total);
            }
            Err(e) => return Err(e),
        }
    };
    let content = render(&conversations, &config.export)?;
    let output_path = output_path(&cli, &config);

    write_output(&output_path, &content)?;

    let stats = ExportStats::collect(&conversations);
    println!(
        "{} Exported {} conversations to {}",
        "✓".green().bold(),
        conversations.len(),
        output_path.display()
    );
    println!("  {}", format_stats(&stats));

    Ok(())
}

/// Write whatever was fetched before the deadline expired, then surface the
/// cancellation so the process still exits non-zero.
fn salvage_partial(
    cli: &Cli,
    config: &Config,
    completed: Vec<domain::Conversation>,
    total: usize,
) -> domain::Result<()> {
    if !completed.is_empty() {
        let content = render(&completed, &config.export)?;
        let output_path = output_path(cli, config);
        write_output(&output_path, &content)?;
        tracing::warn!(
            fetched = completed.len(),
            total,
            path = %output_path.display(),
            "Deadline expired; wrote partial export"
        );
    }
    Err(AppError::Cancelled { completed, total })
}

/// Ids come from positional arguments, `--ids-file`, or the default ids
/// file in the working directory, in that order.
fn gather_ids(cli: &Cli) -> domain::Result<Vec<String>> {
    if !cli.conversation_ids.is_empty() {
        return Ok(cli.conversation_ids.clone());
    }

    if let Some(ref path) = cli.ids_file {
        return load_conversation_ids(path);
    }

    let default_path = Path::new(DEFAULT_IDS_FILE);
    if default_path.exists() {
        return load_conversation_ids(default_path);
    }

    Err(AppError::Config {
        message: format!(
            "No conversation ids provided; pass them as arguments or create {DEFAULT_IDS_FILE}"
        ),
    })
}

/// Resolve the output file path from the CLI or the configured directory.
fn output_path(cli: &Cli, config: &Config) -> PathBuf {
    cli.output.clone().unwrap_or_else(|| {
        PathBuf::from(&config.export.output_dir).join(format!(
            "conversations.{}",
            config.export.output_format.extension()
        ))
    })
}

/// Write the rendered document, creating parent directories as needed.
fn write_output(path: &Path, content: &str) -> domain::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::io(format!("Failed to create directory {}", parent.display()), e)
            })?;
        }
    }

    let mut file = std::fs::File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create {}", path.display()), e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| AppError::io("Failed to write output file", e))?;

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
