use anyhow::Result;
use clap::{Parser, Subcommand};
use shpf_match::{parse_price, NameMatcher, ParsedPrice, Threshold};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shpf-cli")]
#[command(about = "Second-hand Price Finder command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch listings for every model in the CSV and export the price table.
    Sync,
    /// Score a listing name against a model.
    Match {
        name: String,
        target: String,
        #[arg(long)]
        threshold: f64,
    },
    /// Parse a localized price string.
    ParsePrice { raw: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = shpf_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} models={} sources={} columns={} reports={}",
                summary.run_id,
                summary.models,
                summary.enabled_sources,
                summary.table_columns,
                summary.reports_dir
            );
        }
        Commands::Match {
            name,
            target,
            threshold,
        } => {
            let matcher = NameMatcher::new(Threshold::new(threshold)?);
            let decision = matcher.evaluate(&name, &target);
            println!("score={:.4} accepted={}", decision.score, decision.accepted);
        }
        Commands::ParsePrice { raw } => match parse_price(&raw) {
            Ok(ParsedPrice::Amount(value)) => println!("{value}"),
            Ok(ParsedPrice::Unavailable) => println!("unavailable"),
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
