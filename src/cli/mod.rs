//! Command-line interface for legal-md.
//!
//! `lmd` reads one document, runs it through the engine and writes the result:
//!
//! ```bash
//! # Resolve a contract to stdout
//! lmd contract.md
//!
//! # Annotate fields and write to a file
//! lmd contract.md --field-tracking -o contract.out.md
//!
//! # Full JSON result (text, metadata, field report, stage metrics, diagnostics)
//! lmd contract.md --format json
//!
//! # Read from stdin with options from a file
//! cat contract.md | lmd - --config lmd.toml
//! ```
//!
//! Options are read from `--config` first; flags given on the command line override the
//! file. Diagnostics go to stderr unless `--quiet` is given. When the document sets
//! `meta-json-output` or `meta-yaml-output`, the final metadata is exported as well
//! (see [`export`]).

pub mod export;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::ProcessOptions;
use crate::core::LegalMdError;
use crate::engine::{Engine, ProcessedDocument};
use crate::pipeline::DiagnosticLevel;

/// Output shape for the processed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The resolved document text only.
    Text,
    /// The whole result as pretty-printed JSON.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "lmd",
    about = "Legal Markdown processor - resolve templates, clauses, cross-references and numbering",
    version,
    long_about = None
)]
pub struct Cli {
    /// Document to process, or `-` for stdin.
    input: PathBuf,

    /// Write the output here instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Wrap resolved fields in `<span class="legal-field ...">` annotations.
    #[arg(long)]
    field_tracking: bool,

    /// Mark imported content with HTML comments.
    #[arg(long)]
    import_tracing: bool,

    /// Directory that `@import` paths are resolved against.
    #[arg(long, value_name = "DIR")]
    base_path: Option<PathBuf>,

    /// Skip a stage. May be repeated.
    #[arg(long = "disable", value_name = "STAGE")]
    disabled_stages: Vec<String>,

    /// Date used for `@today` (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    today: Option<NaiveDate>,

    /// Options file (TOML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log stage progress to stderr. `RUST_LOG` takes precedence.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Install the stderr log subscriber for this invocation.
    pub fn init_logging(&self) {
        let default_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Options file values overlaid with command-line flags.
    pub fn build_options(&self) -> Result<ProcessOptions> {
        let mut options = match &self.config {
            Some(path) => ProcessOptions::load_from(path)?,
            None => ProcessOptions::default(),
        };
        options.field_tracking |= self.field_tracking;
        options.import_tracing |= self.import_tracing;
        if self.base_path.is_some() {
            options.base_path.clone_from(&self.base_path);
        }
        for stage in &self.disabled_stages {
            if !options.is_stage_disabled(stage) {
                options.disabled_stages.push(stage.clone());
            }
        }
        if self.today.is_some() {
            options.today = self.today;
        }
        Ok(options)
    }

    pub fn execute(self) -> Result<()> {
        let engine = Engine::new(self.build_options()?)?;
        let reading_stdin = self.input.as_os_str() == "-";

        let doc = if reading_stdin {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw).context("Failed to read document from stdin")?;
            engine.process(&raw)?
        } else {
            engine.process_file(&self.input)?
        };

        if !self.quiet {
            print_diagnostics(&doc);
        }

        let rendered = match self.format {
            OutputFormat::Text => doc.resolved_text.clone(),
            OutputFormat::Json => serde_json::to_string_pretty(&doc)?,
        };
        self.write_output(&rendered)?;

        let document_dir = if reading_stdin {
            PathBuf::from(".")
        } else {
            self.input.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        for path in export::export_metadata(&doc.metadata, &document_dir)? {
            if !self.quiet {
                eprintln!("{} metadata to {}", "Exported".green(), path.display());
            }
        }
        Ok(())
    }

    fn write_output(&self, rendered: &str) -> Result<()> {
        match &self.output {
            Some(path) => std::fs::write(path, rendered).map_err(|_| {
                LegalMdError::FileSystem {
                    operation: "write output".to_string(),
                    path: path.display().to_string(),
                }
                .into()
            }),
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(rendered.as_bytes())?;
                if !rendered.ends_with('\n') {
                    stdout.write_all(b"\n")?;
                }
                Ok(())
            }
        }
    }
}

fn print_diagnostics(doc: &ProcessedDocument) {
    for diagnostic in &doc.diagnostics {
        let label = match diagnostic.level {
            DiagnosticLevel::Info => "info".blue(),
            DiagnosticLevel::Warning => "warning".yellow(),
            DiagnosticLevel::Error => "error".red().bold(),
        };
        eprintln!("{label} [{}]: {}", diagnostic.stage, diagnostic.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "field-tracking = false\ndisabled-stages = [\"conditions\"]\ntoday = \"2020-01-01\"")
            .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from([
            "lmd",
            "doc.md",
            "--config",
            path,
            "--field-tracking",
            "--disable",
            "headers",
            "--today",
            "2024-05-01",
        ])
        .unwrap();
        let options = cli.build_options().unwrap();

        assert!(options.field_tracking);
        assert_eq!(options.disabled_stages, ["conditions", "headers"]);
        assert_eq!(options.today, NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn test_defaults_without_config() {
        let cli = Cli::try_parse_from(["lmd", "-"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.build_options().unwrap(), ProcessOptions::default());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["lmd", "doc.md", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_execute_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.md");
        let output = dir.path().join("out.md");
        std::fs::write(&input, "---\nname: Acme\n---\nHello {{name}}").unwrap();

        let cli = Cli::try_parse_from([
            "lmd",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "-q",
        ])
        .unwrap();
        cli.execute().unwrap();
        assert_eq!(std::fs::read_to_string(output).unwrap(), "Hello Acme");
    }
}
