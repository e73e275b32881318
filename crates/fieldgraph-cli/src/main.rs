use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use fieldgraph_analysis::{AnalysisReport, Analyzer, CycleReport, Ingestion};
use fieldgraph_core::{ConfigManager, FieldGraphConfig, LoggingConfig, RecordBundle};
use fieldgraph_graph::CycleClassification;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "fieldgraph")]
#[command(about = "FieldGraph - field ownership and extension cycle analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file (defaults to .fieldgraph.toml, then ~/.fieldgraph/config.toml)
    #[arg(short, long, global = true, env = "FIELDGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve field ownership, usage and extension cycles for a record bundle
    Analyze {
        /// JSON record bundle produced by a scanner
        input: PathBuf,

        /// Detection count above which a cycle is reported as likely spurious
        #[arg(short, long)]
        threshold: Option<usize>,
    },

    /// Only detect model extension cycles
    Cycles {
        /// JSON record bundle produced by a scanner
        input: PathBuf,

        /// Detection count above which a cycle is reported as likely spurious
        #[arg(short, long)]
        threshold: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigManager::load().context("Failed to load configuration")?,
    };
    init_tracing(&manager.config().logging, cli.verbose);
    if let Some(path) = manager.config_path() {
        info!("Using configuration from {}", path.display());
    }

    match execute_command(&cli, manager.into_config()) {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,fieldgraph_core={level},fieldgraph_graph={level},fieldgraph_analysis={level},fieldgraph={level}")));
    let pretty = logging.format == "pretty";

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty.then(|| fmt::layer().pretty().with_writer(std::io::stderr)))
        .with((!pretty).then(|| fmt::layer().compact().with_writer(std::io::stderr)))
        .init();
}

fn execute_command(cli: &Cli, config: FieldGraphConfig) -> Result<()> {
    match &cli.command {
        Commands::Analyze { input, threshold } => {
            let config = with_threshold(config, *threshold)?;
            let ingestion = ingest(input)?;
            let report = Analyzer::new(&config).run(&ingestion);
            match cli.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Pretty => print_report(&report),
            }
        }
        Commands::Cycles { input, threshold } => {
            let config = with_threshold(config, *threshold)?;
            let ingestion = ingest(input)?;
            let cycles = Analyzer::new(&config).detect_cycles(&ingestion);
            match cli.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cycles)?),
                OutputFormat::Pretty => print_cycles(&cycles),
            }
        }
    }
    Ok(())
}

/// Apply a command-line threshold and re-validate, so the flag obeys the same rules as the file.
fn with_threshold(mut config: FieldGraphConfig, threshold: Option<usize>) -> Result<FieldGraphConfig> {
    if let Some(threshold) = threshold {
        config.analysis.spurious_cycle_threshold = threshold;
    }
    let manager = ConfigManager::from_config(config).context("Invalid --threshold")?;
    Ok(manager.into_config())
}

fn ingest(input: &Path) -> Result<Ingestion> {
    let json = fs::read_to_string(input)
        .with_context(|| format!("Failed to read record bundle {}", input.display()))?;
    let bundle = RecordBundle::from_json(&json)
        .with_context(|| format!("Failed to parse record bundle {}", input.display()))?;
    info!("Loaded {} records from {}", bundle.len(), input.display());
    Ok(Ingestion::from_bundle(bundle))
}

fn print_report(report: &AnalysisReport) {
    println!("{}", "Field ownership".cyan().bold());
    println!(
        "  {}: {}",
        "definitions".cyan(),
        report.fields.len().to_string().yellow()
    );
    println!(
        "  {}: {}",
        "canonical fields".cyan(),
        report.canonical_fields.to_string().yellow()
    );
    let extensions = report.fields.iter().filter(|f| f.is_extension).count();
    println!(
        "  {}: {}",
        "extension definitions".cyan(),
        extensions.to_string().yellow()
    );
    println!(
        "  {}: {}",
        "shared fields".cyan(),
        report.shared_fields.len().to_string().yellow()
    );
    println!(
        "  {}: {}",
        "unused fields".cyan(),
        report.unused_fields.len().to_string().yellow()
    );
    if report.unresolved_references > 0 {
        println!(
            "  {}: {}",
            "unresolved references".cyan(),
            report.unresolved_references.to_string().red()
        );
    }

    let needing_update: Vec<_> = report
        .modules
        .iter()
        .filter(|m| !m.missing_dependencies.is_empty())
        .collect();
    if !needing_update.is_empty() {
        println!("\n{}", "Modules extending fields outside their dependencies".cyan().bold());
        for module in needing_update {
            let missing: Vec<&str> = module
                .missing_dependencies
                .iter()
                .map(|m| m.as_str())
                .collect();
            println!("  {} -> {}", module.module.as_str().green(), missing.join(", ").red());
        }
    }

    let plan = &report.restructuring;
    if !plan.core_candidates.is_empty() {
        println!("\n{}", "Core module candidates".cyan().bold());
        for candidate in &plan.core_candidates {
            let used_in: Vec<&str> = candidate.used_in.iter().map(|m| m.as_str()).collect();
            println!(
                "  {} ({}) used in {}",
                candidate.key.green(),
                candidate.current_module.as_str(),
                used_in.join(", ")
            );
        }
    }
    if !plan.priority_order.is_empty() {
        println!("\n{}", "Modules to move, in order".cyan().bold());
        for module in &plan.priority_order {
            let Some(moved) = plan.modules_to_move.iter().find(|m| &m.root_module == module) else {
                continue;
            };
            println!("  {} {}", module.as_str().green(), moved.reasons.join("; "));
        }
    }

    if !report.ingest.rejected.is_empty() {
        println!("\n{}", "Rejected records".cyan().bold());
        for rejected in &report.ingest.rejected {
            println!("  {}: {}", rejected.kind.to_string().yellow(), rejected.reason);
        }
    }

    println!();
    print_cycles(&report.cycles);
    println!(
        "  {}: {}",
        "self-extending models".cyan(),
        report.cycle_summary.self_extending_models.to_string().yellow()
    );
}

fn print_cycles(cycles: &[CycleReport]) {
    println!("{}", "Extension cycles".cyan().bold());
    if cycles.is_empty() {
        println!("  {}", "none".green());
        return;
    }
    for cycle in cycles {
        let label = match cycle.classification {
            CycleClassification::RealCandidate => cycle.classification.to_string().red(),
            CycleClassification::LikelySpurious => cycle.classification.to_string().yellow(),
        };
        println!(
            "  {} [{}] x{}",
            cycle.describe(),
            label,
            cycle.detection_count.to_string().yellow()
        );
        for edge in &cycle.edges {
            let modules: Vec<&str> = edge.declared_by.iter().map(|m| m.as_str()).collect();
            println!(
                "    {} -> {} ({})",
                edge.from.as_str(),
                edge.to.as_str(),
                modules.join(", ")
            );
        }
    }
}
