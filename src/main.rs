use clap::Parser;
use std::panic;
use tracing::{error, info};

use calc_api::config::{load_config_from, Cli};
use calc_api::logging::setup_tracing;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match load_config_from(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = setup_tracing(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    // Log only; worker panics already become 500 responses
    panic::set_hook(Box::new(|panic_info| {
        error!(?panic_info, "Panic occurred");
    }));

    info!(
        environment = config.environment.as_str(),
        storage = ?config.storage.backend,
        "calc-api starting up"
    );

    if let Err(e) = calc_api::run_server(config).await {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }
}
