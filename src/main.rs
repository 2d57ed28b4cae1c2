use std::process::ExitCode;

use clap::Parser;
use stac_loader::cli::{run, Cli};
use stac_loader::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    logging::init("info");
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) => {
            let code = outcome.exit_code();
            tracing::info!(exit_code = code, "CLI completed");
            ExitCode::from(code)
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
