use clap::Parser;

use pocketledger::{
    cli,
    config::{CliArgs, Config},
    logging, Ledger,
};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let config = Config::load(&args);
    logging::init(&config.logging);

    tracing::debug!(config = %args.config, "Configuration loaded");

    let session = match config.session() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let ledger = match Ledger::open(&config, session) {
        Ok(ledger) => ledger,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open ledger");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = cli::run(&ledger, args.command).await;
    ledger.flush_pending_sync().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
