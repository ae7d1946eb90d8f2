/// Session management module - Gateway

mod conversation;
mod store;
mod turn;

pub use conversation::{ExportFormat, SessionManager};
pub use store::HistoryStore;
pub use turn::{Role, Turn};
