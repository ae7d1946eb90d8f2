pub mod app;
pub mod cli;
pub mod constants;
pub mod context;
pub mod models;
pub mod runtime;
pub mod session;
pub mod utils;

pub use app::{load_config, Config};
pub use context::{ContextLoader, LoaderConfig};
pub use models::{ClientFactory, CompletionClient, CompletionOptions, ProjectContext};
pub use runtime::{Orchestrator, Runner};
pub use session::{ExportFormat, HistoryStore, Role, SessionManager, Turn};
pub use utils::AzccError;
