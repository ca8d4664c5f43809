use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use visitlog::clock::SystemClock;
use visitlog::config::DatabaseConfig;
use visitlog::stats::{StatsAggregator, DEFAULT_HOURS, DEFAULT_TOP_N, MAX_HOURS, MAX_TOP_N};
use visitlog::storage;

#[derive(Parser)]
#[command(name = "visitlog-admin")]
#[command(about = "Visitor log inspection CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show visit counts over a recent window
    Stats {
        /// Number of top IPs to list (1-100)
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: u32,
        /// Window size in hours (1-720)
        #[arg(long, default_value_t = DEFAULT_HOURS)]
        hours: u32,
    },
    /// List the most recent visits
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = DatabaseConfig::from_env()?;
    let storage = storage::connect(&config).await?;

    match cli.command {
        Commands::Stats { top_n, hours } => {
            if !(1..=MAX_TOP_N).contains(&top_n) {
                bail!("--top-n must be between 1 and {MAX_TOP_N}");
            }
            if !(1..=MAX_HOURS).contains(&hours) {
                bail!("--hours must be between 1 and {MAX_HOURS}");
            }

            let aggregator = StatsAggregator::new(Arc::clone(&storage), Arc::new(SystemClock));
            let stats = aggregator.stats(top_n, hours).await?;

            println!("Visits since {} ({}h)", stats.since.to_rfc3339(), stats.hours);
            println!("  total visits: {}", stats.total_visits);
            println!("  unique IPs:   {}", stats.unique_ips);
            if stats.top_ips.is_empty() {
                println!("No visits in this window.");
            } else {
                println!("{:<40} {}", "IP", "Count");
                println!("{}", "-".repeat(50));
                for entry in stats.top_ips {
                    println!("{:<40} {}", entry.ip, entry.count);
                }
            }
        }
        Commands::Recent { limit } => {
            let visits = storage.recent_visits(limit).await?;
            if visits.is_empty() {
                println!("No visits recorded.");
            } else {
                println!("{:<26} {:<40} {:<20} {}", "Time", "IP", "Region", "User agent");
                println!("{}", "-".repeat(110));
                for visit in visits {
                    let time = visit
                        .created_at_utc()
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| visit.created_at.to_string());
                    println!(
                        "{:<26} {:<40} {:<20} {}",
                        time,
                        visit.ip,
                        visit.region.as_deref().unwrap_or("-"),
                        visit.user_agent.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}
