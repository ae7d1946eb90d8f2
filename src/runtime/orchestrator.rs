use anyhow::{bail, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::interactive::{run_interactive, spawn_stdin_reader};
use super::runner::Runner;
use crate::{
    app::{load_config_from, Config},
    cli::{handle_command, Cli, Commands},
    context::ContextLoader,
    models::{ClientFactory, ProjectContext},
    session::{HistoryStore, SessionManager},
};

/// What a single invocation asks the backend to do
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Ask(String),
    Continue(String),
    Explain(PathBuf),
    Interactive,
}

impl Action {
    fn from_cli(cli: &Cli) -> Option<Self> {
        match &cli.command {
            Some(Commands::Explain { file }) => Some(Self::Explain(file.clone())),
            Some(Commands::Interactive) => Some(Self::Interactive),
            Some(Commands::Clear | Commands::Init) => None,
            None => cli
                .continue_with
                .clone()
                .map(Self::Continue)
                .or_else(|| cli.prompt.clone().map(Self::Ask)),
        }
    }

    /// Whether the session must be written back afterwards
    fn records_history(&self) -> bool {
        !matches!(self, Self::Explain(_))
    }
}

/// Main runtime orchestrator
pub struct Orchestrator {
    cli: Cli,
    config: Config,
}

impl Orchestrator {
    /// Load configuration and apply command-line overrides
    pub fn new(cli: Cli) -> Result<Self> {
        let mut config = load_config_from(cli.config.as_deref())?;

        if let Some(temperature) = cli.temperature {
            config.model.temperature = temperature;
            config.validate()?;
        }
        if cli.no_stream {
            config.ui.stream = false;
        }

        debug!(
            history = %config.history.file.display(),
            deployment = %config.azure.deployment,
            "Configuration loaded"
        );
        Ok(Self { cli, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the orchestrator
    pub async fn run(self) -> Result<()> {
        let store = HistoryStore::new(&self.config.history.file);
        // `clear` must work even when the history file cannot be read
        let turns = match self.cli.command {
            Some(Commands::Clear) => Vec::new(),
            _ => store.load()?,
        };
        let mut session = SessionManager::with_turns(turns, self.config.history.max_turns);

        if let Some(path) = &self.cli.export {
            return self.export(&session, path);
        }

        if let Some(command) = &self.cli.command {
            if handle_command(command, &mut session, &store)? {
                return Ok(());
            }
        }

        let Some(action) = Action::from_cli(&self.cli) else {
            bail!("No command specified. Try --help for usage information.");
        };

        let loader = ContextLoader::with_config(self.config.context.loader_config());
        let context = match &self.cli.context {
            Some(dir) => Some(load_project_context(&loader, dir)?),
            None => None,
        };

        let client = ClientFactory::create(&self.config)?;
        let runner = Runner::new(client.as_ref(), ClientFactory::options(&self.config, None))
            .with_streaming(self.config.ui.stream)
            .with_markdown(self.config.ui.render_markdown);

        let outcome = match &action {
            Action::Ask(prompt) => runner
                .ask(&mut session, prompt, context.as_ref())
                .await
                .map(|_| ()),
            Action::Continue(text) => runner
                .continue_conversation(&mut session, text, context.as_ref())
                .await
                .map(|_| ()),
            Action::Explain(file) => runner.explain(file, context.as_ref()).await.map(|_| ()),
            Action::Interactive => {
                run_interactive(spawn_stdin_reader(), &runner, &mut session, &loader, context)
                    .await
                    .map(|outcome| info!(exchanges = outcome.exchanges, "Interactive session finished"))
            }
        };

        // Interactive sessions keep their completed exchanges even when a
        // fatal error ends them.
        if action.records_history() && (outcome.is_ok() || action == Action::Interactive) {
            store.save(session.history())?;
        }

        outcome.map_err(Into::into)
    }

    fn export(&self, session: &SessionManager, path: &Path) -> Result<()> {
        if session.is_empty() {
            println!("{}", "No history to export.".yellow());
        }
        session.export(path, self.cli.export_format)?;
        println!(
            "{}",
            format!("History exported to {}", path.display()).green()
        );
        Ok(())
    }
}

/// Load project context
fn load_project_context(loader: &ContextLoader, dir: &Path) -> Result<ProjectContext> {
    let context = loader.load_context(dir)?;

    if context.is_empty() {
        eprintln!(
            "{}",
            format!("No readable files found in {}", dir.display()).yellow()
        );
    } else {
        eprintln!(
            "{}",
            format!("Loaded context from {} files in {}", context.len(), dir.display()).dimmed()
        );
    }
    for file in context.truncated_files() {
        debug!("Truncated context file {}", file);
    }

    Ok(context)
}
