use clap::{Parser, Subcommand};
use crm_etl::config::PipelineConfig;
use crm_etl::logging;
use crm_etl::pipeline::Pipeline;
use crm_etl::report::RunReport;
use crm_etl::sink::SqliteSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(name = "crm_etl")]
#[command(about = "CRM extract cleaning and loading pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: extract, clean, dedupe, link, validate, load
    Run,
    /// Validate source files and destination tables without loading anything
    Check,
}

fn print_summary(report: &RunReport) {
    println!("\n📊 Run {} results:", report.run_id);
    for count in &report.counts {
        println!(
            "   {:<14} {} extracted, {} loaded",
            count.entity, count.extracted, count.loaded
        );
    }
    println!("   Contacts merged: {}", report.deduped_contacts);
    println!(
        "   Activities linked: {} ({} unresolved)",
        report.linked_activities, report.unlinked_activities
    );
    println!("   Flags: {}", report.flags.len());
    println!("   Excluded records: {}", report.exclusions.len());

    if !report.flags.is_empty() {
        println!("\n⚠️  Flagged fields:");
        for flag in &report.flags {
            println!(
                "   - {} {}: {} ({})",
                flag.entity,
                flag.record_id.as_deref().unwrap_or("<no id>"),
                flag.field,
                flag.message
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();

    let config = PipelineConfig::load(&cli.config)?;
    let sink = Arc::new(SqliteSink::open(
        &config.database.path,
        config.database.batch_size,
    )?);
    let pipeline = Pipeline::new(config, sink);

    match cli.command {
        Commands::Run => {
            println!("🚀 Running ETL pipeline...");
            match pipeline.run().await {
                Ok(report) => {
                    print_summary(&report);
                    println!("\n✅ Run completed successfully");
                }
                Err(e) => {
                    error!("ETL run failed: {}", e);
                    println!("❌ ETL run failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Check => {
            println!("🔎 Validating sources and destination tables...");
            match pipeline.check().await {
                Ok(()) => {
                    println!("✅ All column mappings validated");
                }
                Err(e) => {
                    error!("Validation failed: {}", e);
                    println!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}
