// Gateway module for models - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod azure;
mod factory;
mod retry;
mod traits;
mod types;

// Public re-exports - the ONLY way to access model functionality
pub use azure::AzureOpenAIClient;
pub use factory::ClientFactory;
pub use retry::{RetryPolicy, RetryingClient};
pub use traits::CompletionClient;
pub use types::{CompletionOptions, ProjectContext, StreamCallback};
