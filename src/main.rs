use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payflow::application::engine::PaymentEngine;
use payflow::config::AppConfig;
use payflow::domain::ports::PaymentRepositoryBox;
use payflow::infrastructure::in_memory::InMemoryPaymentRepository;
use payflow::interfaces::csv::batch::BatchRunner;
use payflow::interfaces::csv::command_reader::CommandReader;
use payflow::interfaces::csv::payment_writer::PaymentWriter;
use payflow::telemetry;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// JSON file with processors, routing rules and engine settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn open_repository(db_path: Option<PathBuf>) -> Result<PaymentRepositoryBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let repo =
                payflow::infrastructure::rocksdb::RocksDBPaymentRepository::open(path)
                    .into_diagnostic()?;
            Ok(Box::new(repo))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryPaymentRepository::new()))
        }
        None => Ok(Box::new(InMemoryPaymentRepository::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.log_level, cli.json_logs).into_diagnostic()?;

    let config = match &cli.config {
        Some(path) => AppConfig::from_path(path).into_diagnostic()?,
        None => AppConfig::default(),
    };
    let router = config.build_router().await.into_diagnostic()?;
    let repository = open_repository(cli.db_path)?;
    let engine = PaymentEngine::with_config(repository, Arc::new(router), config.engine.clone());

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let mut runner = BatchRunner::new(&engine, CancellationToken::new());
    for command_result in reader.commands() {
        match command_result {
            Ok(command) => {
                if let Err(e) = runner.apply(command).await {
                    eprintln!("Error processing command: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let payments = runner.results().await.into_diagnostic()?;

    // Output final state
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer
        .write_payments(payments.iter().map(|(r, p)| (r.as_str(), p)))
        .into_diagnostic()?;

    Ok(())
}
