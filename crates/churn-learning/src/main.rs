//! CLI entry point for the churn training pipeline.

use anyhow::{Result, anyhow};
use churn_learning::{
    Pipeline, PipelineConfig, PipelineResult, ReportFormat, sinks_for, write_reports,
};
use churn_processing::{FileRowSource, FrameSource, RowSource, generate_churn_dataset};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// CLI-compatible report format selection
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliReportFormat {
    /// results_{timestamp}.json only
    Json,
    /// REPORT_{timestamp}.md only
    Markdown,
    /// Both reports
    Both,
}

impl CliReportFormat {
    fn formats(self) -> Vec<ReportFormat> {
        match self {
            Self::Json => vec![ReportFormat::Json],
            Self::Markdown => vec![ReportFormat::Markdown],
            Self::Both => vec![ReportFormat::Json, ReportFormat::Markdown],
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Customer churn training pipeline",
    long_about = "Cleans a customer table, derives churn features, trains three classifiers \
                  in parallel and reports the best one.\n\n\
                  EXAMPLES:\n  \
                  # Train on a CSV export\n  \
                  churn-learning run -i data/telco.csv -o results/\n\n  \
                  # Train on 5000 synthetic customers\n  \
                  churn-learning run --synthetic --rows 5000\n\n  \
                  # Write a synthetic dataset to disk\n  \
                  churn-learning generate --rows 1000 -o data/synthetic.csv"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Suppress progress output (only show warnings, errors and the summary)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline and write reports
    Run(RunArgs),
    /// Write a synthetic churn dataset as CSV
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// CSV or Parquet file with one row per customer
    #[arg(short, long, required_unless_present = "synthetic", conflicts_with = "synthetic")]
    input: Option<PathBuf>,

    /// Train on a generated dataset instead of a file
    #[arg(long)]
    synthetic: bool,

    /// Rows to generate with --synthetic
    #[arg(long, default_value = "5000")]
    rows: usize,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for the split, the classifiers and --synthetic
    #[arg(long)]
    seed: Option<u64>,

    /// Fraction of rows held out for evaluation
    #[arg(long)]
    test_size: Option<f64>,

    /// Worker threads for training (0 = all cores)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Report formats to write
    #[arg(long, value_enum)]
    format: Option<CliReportFormat>,

    /// Abort the run after this many seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Print the full result as JSON instead of the summary
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Number of customers
    #[arg(long, default_value = "5000")]
    rows: usize,

    /// Generator seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Destination CSV file
    #[arg(short, long, default_value = "data/synthetic_churn.csv")]
    output: PathBuf,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables (RUST_LOG) from .env before the filter reads them
    dotenv().ok();
    init_logging(&cli.log_level, cli.quiet);

    match cli.command {
        Command::Run(args) => run(args),
        Command::Generate(args) => generate(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;

    let result = if args.synthetic {
        info!("Generating {} synthetic customers (seed {})", args.rows, config.seed);
        let df = generate_churn_dataset(args.rows, config.seed)?;
        let source = FrameSource::new(df, config.schema.clone());
        train(source, config.clone())?
    } else {
        let input = args
            .input
            .as_ref()
            .ok_or_else(|| anyhow!("either --input or --synthetic is required"))?;
        if !input.exists() {
            return Err(anyhow!("Input file not found: {}", input.display()));
        }
        let source = FileRowSource::new(input, config.schema.clone());
        train(source, config.clone())?
    };

    let sinks = sinks_for(&config.report_formats, &config.output_dir);
    let written = write_reports(&result, &sinks)?;
    for path in &written {
        debug!("Wrote {}", path.display());
    }

    if args.json {
        println!("{}", result.to_json()?);
    } else {
        print_summary(&result, &written);
    }

    if !result.success {
        return Err(anyhow!("no model could be trained and evaluated"));
    }
    Ok(())
}

/// Start from the config file (or defaults) and apply command-line overrides.
fn build_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            PipelineConfig::from_file(path)?
        }
        None => PipelineConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(fraction) = args.test_size {
        config.test_fraction = fraction;
    }
    if let Some(jobs) = args.jobs {
        config.n_jobs = jobs;
    }
    if let Some(dir) = &args.output {
        config.output_dir = dir.clone();
    }
    if let Some(format) = args.format {
        config.report_formats = format.formats();
    }
    if let Some(secs) = args.max_duration {
        config.max_duration_secs = Some(secs);
    }

    config.validate()?;
    Ok(config)
}

fn train(source: impl RowSource + 'static, config: PipelineConfig) -> Result<PipelineResult> {
    let mut pipeline = Pipeline::builder()
        .config(config)
        .source(source)
        .on_progress(|update| {
            debug!("[{:>3.0}%] {}", update.progress * 100.0, update.message);
        })
        .build()?;

    Ok(pipeline.run()?)
}

fn generate(args: GenerateArgs) -> Result<()> {
    let mut df = generate_churn_dataset(args.rows, args.seed)?;
    write_csv(&mut df, &args.output)?;
    info!(
        "Dataset saved: {} ({} rows x {} columns)",
        args.output.display(),
        df.height(),
        df.width()
    );
    Ok(())
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Human-readable run summary.
///
/// Uses `println!` on purpose: this is the command's output, not a log line,
/// and must show up regardless of the log level.
fn print_summary(result: &PipelineResult, reports: &[PathBuf]) {
    println!("\n{}", "=".repeat(60));
    println!("CHURN PIPELINE SUMMARY");
    println!("{}", "=".repeat(60));
    println!(
        "  Rows: {} train / {} test",
        result.train_samples, result.test_samples
    );
    println!("  Features: {}", result.feature_info.total_features);
    println!(
        "  Execution time: {:.2}s",
        result.total_execution_time_secs
    );
    println!();

    println!(
        "{:<22} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "Model", "Accuracy", "Precision", "Recall", "F1", "AUC"
    );
    println!("{}", "-".repeat(72));
    for row in &result.model_comparison {
        println!(
            "{:<22} {:>9.4} {:>9.4} {:>9.4} {:>9.4} {:>9.4}",
            row.model, row.accuracy, row.precision, row.recall, row.f1, row.auc
        );
    }
    println!();

    match (&result.best_model, &result.best_model_metrics) {
        (Some(name), Some(metrics)) => {
            println!("  Best model: {} (F1 {:.4})", name, metrics.f1);
            println!("  Top features:");
            for (feature, importance) in result.top_features(5) {
                println!("    {:<30} {:.4}", feature, importance);
            }
        }
        _ => println!("  Best model: none"),
    }

    for warning in &result.warnings {
        println!("  Warning: {}", warning);
    }
    if !reports.is_empty() {
        println!();
        for path in reports {
            println!("  Report: {}", path.display());
        }
    }
    println!("{}", "=".repeat(60));
}
