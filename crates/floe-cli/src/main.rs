//! Floe command-line request runner.
//!
//! Replays a script of JSON-lines ingestion requests against an in-memory
//! catalog and prints one JSON response per request.
//!
//! # Usage
//!
//! ```bash
//! # Run a script
//! floe requests.jsonl
//!
//! # Read requests from stdin, with a configuration file
//! cat requests.jsonl | floe --config floe.toml
//!
//! # Keep going after a failed request
//! floe --keep-going -v requests.jsonl
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use floe_common::config::IngestConfig;
use floe_ingest::IngestService;
use floe_lock::{LockManagerConfig, TableLockManager};
use floe_pipeline::JsonPipelineFactory;
use floe_table::{MemoryCatalog, StaticCatalogLoader};

mod script;

use script::{ScriptRunner, Summary};

/// Floe ingestion request runner
#[derive(Parser, Debug)]
#[command(
    name = "floe",
    author = "Floe Team",
    version,
    about = "Replays JSON-lines ingestion requests against an in-memory catalog"
)]
struct Args {
    /// Request script, one JSON request per line; reads stdin when omitted
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "FLOE_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog ids to register
    #[arg(long = "catalog", default_value = "local")]
    catalogs: Vec<String>,

    /// Continue with the next request after a failure
    #[arg(short = 'k', long)]
    keep_going: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", env = "FLOE_LOG_LEVEL")]
    log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<Summary> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    debug!("Loaded configuration: {:?}", config);

    let loader = Arc::new(StaticCatalogLoader::new());
    for catalog_id in &args.catalogs {
        loader.register(catalog_id.clone(), Arc::new(MemoryCatalog::new(catalog_id.clone())));
    }

    let locks = Arc::new(TableLockManager::with_config(LockManagerConfig::from(
        &config.lock,
    )));
    let service = IngestService::new(
        loader,
        Arc::clone(&locks) as _,
        Arc::new(JsonPipelineFactory::from_config(&config.writer)),
        &config,
    )
    .context("failed to start ingest service")?;

    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = ScriptRunner::new(&service, args.keep_going).run(input, &mut out)?;
    out.flush()?;

    let stats = locks.stats().snapshot();
    info!(
        "Script finished: {} requests, {} failed; locks: {} acquired, {} waited, {} timed out",
        summary.handled,
        summary.failed,
        stats.acquisitions,
        stats.waits,
        stats.timeouts
    );
    Ok(summary)
}

fn init_logging(args: &Args) {
    let filter = if args.verbose {
        EnvFilter::new("floe=debug,floe_ingest=debug,floe_table=debug,floe_lock=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(args: &Args) -> Result<IngestConfig> {
    let Some(path) = &args.config else {
        return Ok(IngestConfig::default());
    };
    IngestConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}
