use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;

use azcc::{
    cli::Cli,
    runtime::Orchestrator,
    utils::{exit_code_for, init_logger},
};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logger(cli.verbose);

    let result = match Orchestrator::new(cli) {
        Ok(orchestrator) => orchestrator.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
