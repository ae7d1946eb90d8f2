use colored::Colorize;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::debug;

use super::runner::Runner;
use crate::context::ContextLoader;
use crate::models::ProjectContext;
use crate::session::{ExportFormat, SessionManager};
use crate::utils::{AzccError, Result};

/// One line of REPL input
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Exit,
    Context(PathBuf),
    Clear,
    History,
    Export(PathBuf),
    Empty,
    Prompt(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let lower = line.to_lowercase();

        match lower.as_str() {
            "" => return Self::Empty,
            "exit" | "quit" | "q" => return Self::Exit,
            "clear" => return Self::Clear,
            "history" => return Self::History,
            _ => {}
        }

        if let Some(arg) = command_arg(line, "context") {
            Self::Context(PathBuf::from(arg))
        } else if let Some(arg) = command_arg(line, "export") {
            Self::Export(PathBuf::from(arg))
        } else {
            Self::Prompt(line.to_string())
        }
    }
}

/// `context src` -> `src`, matching the keyword case-insensitively
fn command_arg<'l>(line: &'l str, keyword: &str) -> Option<&'l str> {
    let (head, rest) = line.split_once(char::is_whitespace)?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    Some(rest.trim()).filter(|arg| !arg.is_empty())
}

/// Summary of an interactive session
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InteractiveOutcome {
    /// Completed question/answer exchanges
    pub exchanges: usize,
}

/// Read stdin lines on a plain thread. A blocked read there never holds up
/// runtime shutdown, unlike `tokio::io::stdin`.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    debug!("Stopped reading stdin: {}", e);
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read prompts from `input` until exit, end of input or Ctrl-C. Each
/// prompt continues the conversation held in `session`.
pub async fn run_interactive(
    mut input: mpsc::Receiver<String>,
    runner: &Runner<'_>,
    session: &mut SessionManager,
    loader: &ContextLoader,
    mut context: Option<ProjectContext>,
) -> Result<InteractiveOutcome> {
    println!(
        "{}",
        "Starting interactive AzureCC session. Type 'exit' or 'quit' to end."
            .green()
            .bold()
    );
    println!(
        "{}",
        "Type 'context <path>' to set project context.".green().bold()
    );

    let mut outcome = InteractiveOutcome::default();

    loop {
        print!("\n[azcc]> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = input.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}", "Session terminated by user.".yellow());
                break;
            }
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Exit => break,
            ReplCommand::Empty => continue,
            ReplCommand::Context(path) => match loader.load_context(&path) {
                Ok(loaded) if loaded.is_empty() => {
                    println!("{}", "No files found in the specified path.".yellow());
                }
                Ok(loaded) => {
                    println!(
                        "{}",
                        format!("Context set with {} files from {}", loaded.len(), path.display())
                            .green()
                    );
                    context = Some(loaded);
                }
                Err(e) => println!("{} {}", "Warning:".yellow().bold(), e),
            },
            ReplCommand::Clear => {
                session.clear();
                println!("{}", "Conversation history cleared.".green());
            }
            ReplCommand::History => print_history(session),
            ReplCommand::Export(path) => match session.export(&path, ExportFormat::Jsonl) {
                Ok(()) => println!(
                    "{}",
                    format!("History exported to {}", path.display()).green()
                ),
                Err(e) => println!("{} {}", "Error:".red().bold(), e),
            },
            ReplCommand::Prompt(prompt) => {
                let reply = tokio::select! {
                    reply = runner.continue_conversation(session, &prompt, context.as_ref()) => reply,
                    _ = tokio::signal::ctrl_c() => {
                        println!("\n{}", "Request cancelled.".yellow());
                        continue;
                    }
                };
                match reply {
                    Ok(_) => outcome.exchanges += 1,
                    Err(e @ AzccError::Auth(_)) => return Err(e),
                    Err(e) => println!("{} {}", "Error:".red().bold(), e),
                }
            }
        }
    }

    debug!("Interactive session ended after {} exchanges", outcome.exchanges);
    Ok(outcome)
}

fn print_history(session: &SessionManager) {
    if session.is_empty() {
        println!("{}", "No history yet.".yellow());
        return;
    }
    for turn in session.history() {
        println!(
            "{} {}: {}",
            turn.timestamp().format("%H:%M:%S").to_string().dimmed(),
            turn.role().as_str().bold(),
            turn.text()
        );
    }
}
