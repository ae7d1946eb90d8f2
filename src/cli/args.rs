use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::session::ExportFormat;

#[derive(Parser, Debug)]
#[command(name = "azcc")]
#[command(version)]
#[command(about = "Azure Claude Code - AI-powered coding assistant", long_about = None)]
pub struct Cli {
    /// The prompt to send to the AI
    pub prompt: Option<String>,

    /// Attach project files from a directory as context
    #[arg(short, long, value_name = "DIR")]
    pub context: Option<PathBuf>,

    /// Continue the saved conversation with this message
    #[arg(long = "continue", value_name = "TEXT", conflicts_with = "prompt")]
    pub continue_with: Option<String>,

    /// Export conversation history to a file and exit
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Format used by --export
    #[arg(long, value_enum, default_value_t = ExportFormat::Jsonl, requires = "export")]
    pub export_format: ExportFormat,

    /// Print the whole response at once instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Sampling temperature for this invocation
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Explain the code in a file
    Explain {
        /// File to explain
        file: PathBuf,
    },
    /// Start an interactive session
    Interactive,
    /// Delete the saved conversation history
    Clear,
    /// Write a default configuration file
    Init,
}
