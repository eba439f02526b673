use clap::{Parser, Subcommand};
use drug_event_etl::apis::OpenFdaClient;
use drug_event_etl::common::constants::{search_term_for_drug, DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT};
use drug_event_etl::common::types::ReportSource;
use drug_event_etl::config::Config;
use drug_event_etl::pipeline::{Pipeline, RunSummary};
use drug_event_etl::storage::{open_store, StoreLease};
use drug_event_etl::{logging, observability, EtlError};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "drug_event_etl")]
#[command(about = "Load openFDA adverse drug event reports into a report store")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize and store one batch of reports
    Run {
        /// Drug name; expands to a medicinal product search
        #[arg(long, conflicts_with = "query", required_unless_present = "query")]
        drug: Option<String>,
        /// Raw openFDA search expression
        #[arg(long)]
        query: Option<String>,
        /// Records to fetch (clamped to 1..=100)
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT as i64)]
        limit: i64,
        /// Archive the raw batch to this directory
        #[arg(long)]
        save_raw: Option<PathBuf>,
    },
    /// Number of stored reports
    Count,
    /// Print one stored report as JSON
    Get { report_id: String },
    /// Delete one stored report
    Delete { report_id: String },
    /// Print the first stored reports as JSON
    List {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Check that the source answers and the store opens
    Check,
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Run {} ({})", summary.run_id, summary.query);
    println!("   Attempted:  {}", summary.attempted);
    println!("   Loaded:     {}", summary.loaded);
    println!("   Duplicates: {}", summary.duplicates);
    println!("   Failed:     {}", summary.failed);

    if !summary.errors.is_empty() {
        println!("\n⚠️  Errors encountered:");
        for error in &summary.errors {
            println!("   - {}", error);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    if let Err(e) = observability::init() {
        warn!("Metrics disabled: {}", e);
    }

    let config = Config::load()?;
    let sink = open_store(&config.store)?;

    match cli.command {
        Commands::Run {
            drug,
            query,
            limit,
            save_raw,
        } => {
            let query = match (drug, query) {
                (Some(drug), _) => search_term_for_drug(&drug),
                (None, Some(query)) => query,
                (None, None) => anyhow::bail!("either --drug or --query is required"),
            };
            let source = OpenFdaClient::new(&config.source)?;
            let lease = StoreLease::acquire(sink.as_ref()).await?;

            let pipeline = Pipeline::new(&source, &*lease)
                .with_raw_archive(save_raw.or(config.archive.raw_dir.clone()));

            match pipeline.run(&query, limit).await {
                Ok(summary) => {
                    info!("Pipeline finished");
                    print_summary(&summary);
                }
                Err(EtlError::RunAborted { reason, summary }) => {
                    error!("Run aborted: {}", reason);
                    print_summary(&summary);
                    anyhow::bail!("run aborted: {reason}");
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Count => {
            let lease = StoreLease::acquire(sink.as_ref()).await?;
            println!("{}", lease.count().await?);
        }
        Commands::Get { report_id } => {
            let lease = StoreLease::acquire(sink.as_ref()).await?;
            match lease.get(&report_id).await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => anyhow::bail!("report {report_id} not found"),
            }
        }
        Commands::Delete { report_id } => {
            let lease = StoreLease::acquire(sink.as_ref()).await?;
            if !lease.delete(&report_id).await? {
                anyhow::bail!("report {report_id} not found");
            }
            println!("Deleted {}", report_id);
        }
        Commands::List { limit } => {
            let lease = StoreLease::acquire(sink.as_ref()).await?;
            let reports = lease.list(limit).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Check => {
            let source = OpenFdaClient::new(&config.source)?;
            let source_ok = source.test_connection().await;
            println!(
                "{} {}",
                if source_ok { "✅" } else { "❌" },
                source.endpoint()
            );

            let store_ok = match StoreLease::acquire(sink.as_ref()).await {
                Ok(_) => true,
                Err(e) => {
                    error!("Store check failed: {}", e);
                    false
                }
            };
            println!(
                "{} {}",
                if store_ok { "✅" } else { "❌" },
                sink.describe()
            );

            if !(source_ok && store_ok) {
                anyhow::bail!("connectivity check failed");
            }
        }
    }

    Ok(())
}
