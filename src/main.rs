// src/main.rs

use clap::{Args, Parser, Subcommand};
use laundry_ledger::aggregate::{aggregate, weight_series};
use laundry_ledger::config::Config;
use laundry_ledger::llm_extract::{self, LlmExtractor};
use laundry_ledger::record::OrderRecord;
use laundry_ledger::ScanError;
use laundry_ledger::session::Session;
use laundry_ledger::{export, store};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = ".config/laundry_ledger.toml";

/// Turn photos of laundry delivery notes and ledger pages into order records.
#[derive(Parser)]
#[command(name = "laundry_ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read order rows from one or more photos, in the order given
    Scan(ScanArgs),

    /// Print the response schema sent to the inference service
    Schema,
}

#[derive(Args)]
struct ScanArgs {
    /// Image files (JPEG, PNG, WebP, GIF)
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Write every record to CSV (path from config unless --output is given)
    #[arg(long)]
    export: bool,

    /// CSV path, overrides `export_path` from the config
    #[arg(long, requires = "export")]
    output: Option<PathBuf>,

    /// Only show records whose customer, order number or service contains this
    #[arg(long)]
    search: Option<String>,

    /// Print records as JSON instead of a grouped listing
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Scan(args) => scan(args, cfg).await,
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&llm_extract::response_schema())?);
            Ok(())
        }
    }
}

async fn scan(args: ScanArgs, cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let extractor = LlmExtractor::connect(&cfg.llm).await?;
    let mut session = Session::new(extractor);

    // One image at a time: each scan finishes before the next is sent.
    let mut failed = 0usize;
    for path in &args.images {
        match session.scan_file(path).await {
            Ok(added) => info!(path = %path.display(), added, "Image processed"),
            Err(e @ ScanError::Read { .. }) => {
                failed += 1;
                error!(path = %path.display(), error = %e, "Error reading file");
            }
            Err(e) => {
                failed += 1;
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to extract data. Please ensure the text is legible and try again"
                );
            }
        }
    }

    if failed == args.images.len() {
        return Err(format!("none of the {failed} image(s) could be read").into());
    }

    let store = session.store();
    let shown: Vec<&OrderRecord> = match args.search.as_deref() {
        Some(term) => store.search(term),
        None => store.all().iter().collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
    } else {
        print_listing(&shown);
    }

    if args.export {
        let path = args
            .output
            .unwrap_or_else(|| PathBuf::from(&cfg.export_path));
        export::write_export(&path, store.all())?;
        println!("Exported {} record(s) to {}", store.len(), path.display());
    }

    let stats = store.stats();
    info!(
        orders = stats.total_orders,
        customers = stats.unique_customers,
        weight_kg = %stats.weight_display(),
        paid = %stats.paid_display(),
        deductions = %stats.deduction_display(),
        failed_images = failed,
        "Session statistics"
    );

    Ok(())
}

fn print_listing(records: &[&OrderRecord]) {
    println!("{} record(s) found", records.len());

    for (service, group) in store::group_by_service(records.iter().copied()) {
        println!();
        println!("== {service} ({} order(s))", group.len());
        for r in group {
            println!(
                "  {:<8} {:<10} {:<24} {:>8} {:>10} {:>10}  [{}]",
                r.order_number,
                r.date,
                r.customer_name,
                r.weight,
                r.client_total_paid,
                r.total_deduction,
                r.id
            );
        }
    }

    let series = weight_series(records.iter().copied());
    if !series.is_empty() {
        println!();
        println!("Laundry weight (kg) per order");
        for point in series {
            println!("  {:<30} {:>8}", point.full_label, point.weight.to_string());
        }
    }

    let stats = aggregate(records.iter().copied());
    println!();
    println!(
        "Total weight: {} kg | Orders: {} | Paid: €{} | Deductions: €{} | Unique clients: {}",
        stats.weight_display(),
        stats.total_orders,
        stats.paid_display(),
        stats.deduction_display(),
        stats.unique_customers
    );
}
