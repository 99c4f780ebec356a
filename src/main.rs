// src/main.rs
use std::process::exit;
use clap::Parser;
use tracing::{debug, error, Level};

use cloudflow::cli::{execute, Args};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging, more detail with --verbose
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
    debug!("Verbose mode enabled");

    if let Err(e) = execute(&args).await {
        error!("Command execution failed: {:#}", e);
        exit(1);
    }
}
