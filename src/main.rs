//! # Butterfly-access CLI
//!
//! Command-line interface for the butterfly-access library.
//! Scores supply and demand CSV tables against a precomputed OD table.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use butterfly_access::{
    AnalysisConfig, AnalysisParameters, CsvMatrixProvider, DecayParameters, LocationTable,
    RunOptions,
};
use clap::Parser;
use log::{error, info};

mod cli;

/// Command-line interface for butterfly-access
#[derive(Parser)]
#[command(name = "butterfly-access")]
#[command(about = "Two-step floating catchment area (E2SFCA / V2SFCA) accessibility scores")]
#[command(long_about = "Scores demand locations by their access to supply locations:
  butterfly-access --config e2sfca.yaml --supply hospitals.csv --demand tracts.csv --matrix od.csv
  butterfly-access --config v2sfca.yaml ... --reverse-matrix od_back.csv   # asymmetric network

Outputs:
  --output                         # scored demand table (default: <demand>_access.csv)
  --supply-output                  # scored supply table (not written unless given)
  --summary                        # JSON run summary (default: stdout)")]
#[command(version = env!("BUTTERFLY_VERSION"))]
struct Cli {
    /// YAML analysis configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Supply locations CSV
    #[arg(long)]
    supply: Option<PathBuf>,

    /// Demand locations CSV
    #[arg(long)]
    demand: Option<PathBuf>,

    /// Supply-to-demand OD table (origin_id,destination_id,travel_cost)
    #[arg(long)]
    matrix: Option<PathBuf>,

    /// Demand-to-supply OD table; the forward table is transposed when absent
    #[arg(long)]
    reverse_matrix: Option<PathBuf>,

    /// Scored demand CSV
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Scored supply CSV
    #[arg(long)]
    supply_output: Option<PathBuf>,

    /// JSON run summary path, or "-" for stdout
    #[arg(long, default_value = "-")]
    summary: String,

    /// Worker threads (default: number of CPUs)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Validate the configuration and print the decay parameters without scoring
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Summary destination types
#[derive(Debug, PartialEq)]
enum SummaryDestination {
    File(PathBuf),
    Stdout,
}

/// Resolve the scored demand table path from CLI arguments
fn resolve_output(demand: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => {
            let stem = demand
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("demand");
            demand.with_file_name(format!("{stem}_access.csv"))
        }
    }
}

fn resolve_summary(summary: &str) -> SummaryDestination {
    if summary == "-" || summary.is_empty() {
        SummaryDestination::Stdout
    } else {
        SummaryDestination::File(PathBuf::from(summary))
    }
}

fn main() {
    if let Err(e) = run() {
        error!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        eprintln!("🦋 Butterfly-access v{} starting...", env!("BUTTERFLY_VERSION"));
    }

    let params = AnalysisConfig::from_path(&cli.config)
        .and_then(|config| config.validate())
        .with_context(|| format!("invalid configuration {}", cli.config.display()))?;

    if cli.dry_run {
        eprintln!(
            "🔍 [DRY RUN] Configuration {} is valid ({})",
            cli.config.display(),
            params.method()
        );
        let decay = DecayParameters::from_parameters(&params);
        println!("{}", serde_json::to_string_pretty(&decay)?);
        return Ok(());
    }

    let supply_path = cli.supply.as_deref().context("--supply is required")?;
    let demand_path = cli.demand.as_deref().context("--demand is required")?;
    let matrix_path = cli.matrix.as_deref().context("--matrix is required")?;

    let threads = cli.threads.unwrap_or_else(num_cpus::get).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("failed to start worker threads")?;
    info!("Using {threads} worker threads");

    score(&cli, &params, supply_path, demand_path, matrix_path)
}

fn score(
    cli: &Cli,
    params: &AnalysisParameters,
    supply_path: &Path,
    demand_path: &Path,
    matrix_path: &Path,
) -> Result<()> {
    let mut supply = LocationTable::from_csv_path(supply_path, &params.supply_id_field)
        .with_context(|| format!("cannot load supply locations {}", supply_path.display()))?;
    let mut demand = LocationTable::from_csv_path(demand_path, &params.demand_id_field)
        .with_context(|| format!("cannot load demand locations {}", demand_path.display()))?;
    eprintln!(
        "📍 {} supply and {} demand locations",
        supply.len(),
        demand.len()
    );

    let mut provider = CsvMatrixProvider::new(matrix_path);
    if let Some(reverse) = &cli.reverse_matrix {
        provider = provider.with_reverse(reverse);
    }

    let progress = cli::ProgressManager::new(&format!("🧮 Running {}", params.method()));
    let options = RunOptions {
        progress: Some(progress.stage_callback()),
    };
    let result =
        butterfly_access::run_with_options(params, &mut supply, &mut demand, &provider, options);
    let output = match result {
        Ok(output) => {
            progress.finish("✅ Scoring completed!");
            output
        }
        Err(e) => {
            progress.abandon();
            return Err(e).context("accessibility run failed");
        }
    };

    let output_path = resolve_output(demand_path, cli.output.as_deref());
    demand
        .write_csv_path(&output_path)
        .with_context(|| format!("cannot write {}", output_path.display()))?;
    eprintln!("📁 Scored demand saved to: {}", output_path.display());

    if let Some(path) = &cli.supply_output {
        supply
            .write_csv_path(path)
            .with_context(|| format!("cannot write {}", path.display()))?;
        eprintln!("📁 Scored supply saved to: {}", path.display());
    }

    let json = serde_json::to_string_pretty(&output.summary)?;
    match resolve_summary(&cli.summary) {
        SummaryDestination::Stdout => println!("{json}"),
        SummaryDestination::File(path) => {
            fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!("📁 Summary saved to: {}", path.display());
        }
    }

    Ok(())
}
