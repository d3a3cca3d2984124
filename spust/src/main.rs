//! spust - rebuild and hot-swap a development server
//!
//! ```bash
//! # Build once and print a JSON summary
//! spust build src --stats
//!
//! # Serve on $PORT, rebuilding whenever src/ changes
//! spust --work-dir ./my-app start src
//! ```

use spust::{Cli, CliResult, Commands, commands, logger};

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sp_config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let work_dir = std::path::absolute(&cli.work_dir)?;

    let config = Config::load(&work_dir)?;
    config.validate()?;

    let log_file = config.logging.file.as_ref().map(|file| work_dir.join(file));
    logger::initialize(config.logging.level, log_file, config.logging.colored)?;

    info!("Starting spust v{}", env!("CARGO_PKG_VERSION"));
    config.log_summary();

    match cli.command {
        Commands::Build { src_dir, stats } => {
            commands::build(&config, &work_dir, &src_dir, stats).await
        }
        Commands::Start { src_dir } => commands::start(&config, &work_dir, &src_dir).await,
    }
}
