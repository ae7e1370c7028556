//! threatdraw command line
//!
//! `convert` turns diagram cell files into Threagile documents; `validate`
//! checks an existing document against the configured rules.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::errors::{ThreatdrawError, ValidationError};
use crate::observability::telemetry::{init_tracing, init_tracing_verbose};
use crate::pipeline::{run_batch, ConversionStats, Pipeline, PipelineOutput};
use crate::threagile::{
    parse_document, DocumentMetadata, ExistingAssets, OutputValidator, ThreagileDocument,
    ValidationReport,
};

#[derive(Parser)]
#[command(name = "threatdraw")]
#[command(about = "Turn architecture diagrams into validated Threagile threat models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (YAML, or TOML by extension)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

/// Serialization of written documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DocumentFormat {
    #[default]
    Yaml,
    Json,
}

impl DocumentFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Yaml => "yaml",
            DocumentFormat::Json => "json",
        }
    }

    fn render(&self, document: &ThreagileDocument) -> crate::errors::Result<String> {
        Ok(match self {
            DocumentFormat::Yaml => document.to_yaml()?,
            DocumentFormat::Json => document.to_json()?,
        })
    }
}

/// Format of the `validate` report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert diagram cell files (JSON or YAML) into threat models
    Convert {
        /// Cell files, converted in parallel
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Directory for the generated documents (stdout when omitted)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "yaml")]
        format: DocumentFormat,

        /// Pre-existing technical assets, data assets and trust boundaries
        #[arg(long, value_name = "FILE")]
        assets: Option<PathBuf>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        /// Document date as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Treat warnings as validation failures
        #[arg(long)]
        strict: bool,
    },

    /// Validate an existing threat model document
    Validate {
        #[arg(value_name = "DOCUMENT")]
        document: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color || std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }
    if cli.verbose {
        init_tracing_verbose();
    } else {
        init_tracing();
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert {
            files,
            output,
            format,
            assets,
            title,
            author,
            date,
            strict,
        } => {
            let date =
                date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let mut metadata = DocumentMetadata::from_config(&config.mapping, &date);
            if let Some(title) = title.as_deref() {
                metadata = metadata.with_title(title);
            }
            if let Some(author) = author.as_deref() {
                metadata = metadata.with_author(author);
            }
            let existing = match assets.as_deref() {
                Some(path) => load_existing_assets(path)?,
                None => ExistingAssets::default(),
            };
            let options = ConvertOptions {
                output,
                format,
                strict,
                quiet: cli.quiet,
            };
            convert(config, files, metadata, existing, &options).await
        }
        Commands::Validate { document, format } => validate(&config, &document, format, cli.quiet),
    }
}

struct ConvertOptions {
    output: Option<PathBuf>,
    format: DocumentFormat,
    strict: bool,
    quiet: bool,
}

fn load_existing_assets(path: &Path) -> Result<ExistingAssets> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read existing assets from {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse existing assets from {}", path.display()))
}

async fn convert(
    config: Config,
    files: Vec<PathBuf>,
    metadata: DocumentMetadata,
    existing: ExistingAssets,
    options: &ConvertOptions,
) -> Result<()> {
    let pipeline = Arc::new(Pipeline::new(config)?.with_existing_assets(existing));
    if let Some(dir) = &options.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let results = run_batch(pipeline, files, metadata).await;
    let mut totals = ConversionStats::default();
    let mut failed: Option<ThreatdrawError> = None;
    let mut rejected = 0usize;
    let mut first_document = true;

    for result in results {
        let label = result.path.display().to_string();
        let output = match result.outcome {
            Ok(output) => output,
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red().bold(), label, e);
                failed.get_or_insert(e);
                continue;
            }
        };

        let rendered = options.format.render(&output.document)?;
        match &options.output {
            Some(dir) => {
                let target = output_path(dir, &result.path, options.format);
                std::fs::write(&target, rendered)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
            }
            None => {
                if !first_document && options.format == DocumentFormat::Yaml {
                    println!("---");
                }
                print!("{}", rendered);
                if options.format == DocumentFormat::Json {
                    println!();
                }
            }
        }
        first_document = false;

        let accepted = output.is_valid() && !(options.strict && output.warnings().next().is_some());
        if !accepted {
            rejected += 1;
        }
        print_output_summary(&label, &output, accepted, options.quiet);
        totals.add(&output.stats);
    }

    if !options.quiet {
        eprintln!(
            "{} components, {} composites, {} flows, {} threats, {} relations ({} warnings, {} errors)",
            totals.components,
            totals.composites,
            totals.flows,
            totals.threats,
            totals.relations,
            totals.warnings.to_string().yellow(),
            totals.errors.to_string().red(),
        );
    }

    if let Some(e) = failed {
        return Err(e.into());
    }
    if rejected > 0 {
        return Err(ThreatdrawError::Validation(ValidationError::Failed {
            errors: totals.errors.max(rejected),
        })
        .into());
    }
    Ok(())
}

fn output_path(dir: &Path, input: &Path, format: DocumentFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "diagram".to_string());
    dir.join(format!("{}.threagile.{}", stem, format.extension()))
}

fn print_output_summary(label: &str, output: &PipelineOutput, accepted: bool, quiet: bool) {
    let marker = if accepted {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    if !quiet || !accepted {
        eprintln!(
            "{} {}: {} components, {} flows, {} threats",
            marker, label, output.stats.components, output.stats.flows, output.stats.threats
        );
    }
    for error in output.errors() {
        eprintln!("  {} {}", "error:".red(), error);
    }
    if !quiet {
        for warning in output.warnings() {
            eprintln!("  {} {}", "warning:".yellow(), warning);
        }
    }
}

fn validate(config: &Config, path: &Path, format: ReportFormat, quiet: bool) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    let value = parse_document(&content).map_err(ThreatdrawError::from)?;
    let validator = OutputValidator::new(&config.validation).map_err(ThreatdrawError::from)?;
    let report = validator.validate_post_conversion(&value);

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print_report(&path.display().to_string(), &report, quiet),
    }

    if report.is_valid {
        Ok(())
    } else {
        Err(ThreatdrawError::Validation(ValidationError::Failed {
            errors: report.errors.len(),
        })
        .into())
    }
}

fn print_report(label: &str, report: &ValidationReport, quiet: bool) {
    for error in &report.errors {
        println!("{} {}", "error:".red(), error);
    }
    if !quiet {
        for warning in &report.warnings {
            println!("{} {}", "warning:".yellow(), warning);
        }
    }
    if report.is_valid {
        println!("{} {} is valid", "✓".green().bold(), label);
    } else {
        println!(
            "{} {} has {} error(s)",
            "✗".red().bold(),
            label,
            report.errors.len()
        );
    }
}
