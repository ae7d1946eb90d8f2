use anyhow::Result;
use colored::Colorize;

use crate::{
    app::init_config,
    session::{HistoryStore, SessionManager},
};

use super::Commands;

/// Handle subcommands that need no backend. Returns `true` when the
/// command was fully handled here.
pub fn handle_command(
    command: &Commands,
    session: &mut SessionManager,
    store: &HistoryStore,
) -> Result<bool> {
    match command {
        Commands::Init => {
            match init_config()? {
                Some(path) => println!(
                    "{}",
                    format!("Configuration written to {}", path.display()).green()
                ),
                None => println!("{}", "Configuration file already exists.".yellow()),
            }
            Ok(true)
        }
        Commands::Clear => {
            session.clear();
            store.clear()?;
            println!("{}", "Conversation history cleared.".green());
            Ok(true)
        }
        Commands::Explain { .. } | Commands::Interactive => Ok(false),
    }
}
