//! CLI interface using clap.
//!
//! Mirrors the export workflow: ids come from positional arguments or an
//! ids file, everything else is configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::application::{ConfigLayer, ExportLayer};
use crate::domain::{AppError, Result};

/// Export Intercom conversations to Markdown or JSON.
#[derive(Parser, Debug)]
#[command(name = "intercom-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Specific conversation ids to export. With none given, ids are read
    /// from the ids file.
    pub conversation_ids: Vec<String>,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Output format: markdown or json.
    #[arg(short, long)]
    pub format: Option<String>,

    /// Output file path (default: <output_dir>/conversations.<ext>).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// File holding conversation ids (plain lines or a YAML list).
    #[arg(long)]
    pub ids_file: Option<PathBuf>,

    /// Number of conversations to fetch per batch.
    #[arg(short, long)]
    pub batch_size: Option<u32>,

    /// Abort the run after this many seconds, keeping a partial-progress report.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Build the highest-precedence configuration layer from explicit
    /// command-line arguments.
    ///
    /// # Errors
    /// Returns a configuration error when `--format` names an unknown format.
    pub fn overrides(&self) -> Result<ConfigLayer> {
        let output_format = self
            .format
            .as_deref()
            .map(|f| {
                f.parse().map_err(|e| AppError::Config {
                    message: format!("--format: {e}"),
                })
            })
            .transpose()?;

        Ok(ConfigLayer {
            export: ExportLayer {
                output_format,
                batch_size: self.batch_size,
                ..ExportLayer::default()
            },
            ..ConfigLayer::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutputFormat;

    #[test]
    fn test_overrides_carry_format_and_batch_size() {
        let cli = Cli::parse_from(["intercom-export", "--format", "json", "-b", "5", "123"]);
        let layer = cli.overrides().unwrap();

        assert_eq!(layer.export.output_format, Some(OutputFormat::Json));
        assert_eq!(layer.export.batch_size, Some(5));
        assert_eq!(cli.conversation_ids, vec!["123"]);
    }

    #[test]
    fn test_unknown_format_is_config_error() {
        let cli = Cli::parse_from(["intercom-export", "--format", "xml"]);
        assert!(matches!(
            cli.overrides().unwrap_err(),
            AppError::Config { .. }
        ));
    }

    #[test]
    fn test_no_overrides_leaves_layer_empty() {
        let cli = Cli::parse_from(["intercom-export"]);
        assert_eq!(cli.overrides().unwrap(), ConfigLayer::default());
    }
}
