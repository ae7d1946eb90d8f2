/// Runtime orchestrator module - Gateway

mod interactive;
mod orchestrator;
mod runner;

pub use interactive::{run_interactive, spawn_stdin_reader, InteractiveOutcome, ReplCommand};
pub use orchestrator::Orchestrator;
pub use runner::Runner;
