//! CLI entry point for the order analytics ETL pipeline.

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use order_etl::{Pipeline, PipelineConfig, RunOutcome};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Batch ETL for order and user records",
    long_about = "Loads raw orders and users, enforces the schema, runs quality gates,\n\
                  joins users onto orders, treats amount outliers and writes Parquet\n\
                  outputs plus a run metadata document.\n\n\
                  Default layout under --root:\n  \
                  data/raw/{orders,users}.csv\n  \
                  data/processed/{orders_clean,users,analytics_table}.parquet\n  \
                  data/processed/_run_meta.json\n\n\
                  EXAMPLES:\n  \
                  order-etl --root .\n\n  \
                  # Wider outlier fences and CSV reports\n  \
                  order-etl --iqr-k 3 --emit-reports\n\n  \
                  # Metadata only, for scripting\n  \
                  order-etl --json | jq .rows_out"
)]
struct Args {
    /// Project root the default paths are derived from
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Raw orders CSV (default: <root>/data/raw/orders.csv)
    #[arg(long)]
    raw_orders: Option<PathBuf>,

    /// Raw users CSV (default: <root>/data/raw/users.csv)
    #[arg(long)]
    raw_users: Option<PathBuf>,

    /// Cleaned orders Parquet output
    #[arg(long)]
    out_orders_clean: Option<PathBuf>,

    /// Cleaned users Parquet output
    #[arg(long)]
    out_users: Option<PathBuf>,

    /// Analytics table Parquet output
    #[arg(long)]
    out_analytics: Option<PathBuf>,

    /// Run metadata JSON output
    #[arg(long)]
    run_meta: Option<PathBuf>,

    /// IQR multiplier for amount outlier fences
    #[arg(long, default_value = "1.5")]
    iqr_k: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings and errors)
    #[arg(short, long)]
    quiet: bool,

    /// Print the run metadata as JSON to stdout instead of a summary
    ///
    /// Disables all logging so stdout carries only the JSON document.
    #[arg(long)]
    json: bool,

    /// Write the missingness report and revenue summary as CSV
    #[arg(short = 'r', long)]
    emit_reports: bool,

    /// Directory for reports (default: <root>/reports)
    #[arg(long)]
    reports_dir: Option<PathBuf>,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder().root(&args.root).iqr_k(args.iqr_k);

    if let Some(path) = &args.raw_orders {
        builder = builder.raw_orders(path);
    }
    if let Some(path) = &args.raw_users {
        builder = builder.raw_users(path);
    }
    if let Some(path) = &args.out_orders_clean {
        builder = builder.out_orders_clean(path);
    }
    if let Some(path) = &args.out_users {
        builder = builder.out_users(path);
    }
    if let Some(path) = &args.out_analytics {
        builder = builder.out_analytics(path);
    }
    if let Some(path) = &args.run_meta {
        builder = builder.run_meta(path);
    }
    if let Some(dir) = &args.reports_dir {
        builder = builder.reports_dir(dir);
    } else if args.emit_reports {
        builder = builder.reports_dir(args.root.join("reports"));
    }

    Ok(builder.build()?)
}

fn print_summary(outcome: &RunOutcome) {
    let meta = &outcome.metadata;
    println!("\n{}", "=".repeat(60));
    println!("ETL RUN COMPLETE ({})", outcome.final_stage);
    println!("{}", "=".repeat(60));
    println!("  Rows out:            {}", meta.rows_out);
    match meta.missing_created_at {
        Some(n) => println!("  Missing created_at:  {}", n),
        None => println!("  Missing created_at:  n/a"),
    }
    match meta.country_match_rate {
        Some(rate) => println!("  Country match rate:  {:.1}%", rate * 100.0),
        None => println!("  Country match rate:  n/a"),
    }

    if !outcome.coercion_warnings.is_empty() {
        println!("\n  Values coerced to null:");
        for warning in &outcome.coercion_warnings {
            println!(
                "    {}.{}: {}",
                warning.table, warning.column, warning.count
            );
        }
    }

    println!("\n  Outputs:");
    for path in &outcome.artifacts {
        println!("    {}", path.display());
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (disabled if --json is set)
    init_logging(&args.log_level, args.quiet, args.json);

    dotenv().ok();

    let config = build_config(&args)?;
    info!("Raw orders: {}", config.raw_orders.display());
    info!("Raw users: {}", config.raw_users.display());

    let pipeline = Pipeline::builder().config(config).build()?;

    match pipeline.run() {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome.metadata)?);
            } else {
                print_summary(&outcome);
            }
            Ok(())
        }
        Err(e) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&e)?);
            } else {
                error!("Run failed [{}]: {}", e.error_code(), e);
            }
            Err(anyhow!("ETL run failed: {}", e))
        }
    }
}
