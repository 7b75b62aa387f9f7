use clap::Parser;
use perfdash::app::App;
use perfdash::cli::{Args, Command};
use perfdash::config::Config;
use perfdash::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Config comes first so startup logs are never silently dropped.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    let command = args.command.unwrap_or(Command::Serve);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        command = ?command,
        "starting perfdash"
    );

    let app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = format!("{e:#}"), "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        Command::Serve => app.serve().await,
        Command::SeedReference => app.seed_reference().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "Exited with error");
            ExitCode::FAILURE
        }
    }
}
