use async_trait::async_trait;

use super::types::{CompletionOptions, ProjectContext, StreamCallback};
use crate::session::Turn;
use crate::utils::Result;

/// Core trait that all completion backends must implement
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the conversation (plus optional project context) and return the
    /// generated text. With a `stream` callback, text fragments are also
    /// delivered as they arrive.
    async fn complete(
        &self,
        turns: &[Turn],
        context: Option<&ProjectContext>,
        options: &CompletionOptions,
        stream: Option<StreamCallback>,
    ) -> Result<String>;

    /// Name of the backend, for logs and status output
    fn name(&self) -> &str;
}

#[async_trait]
impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    async fn complete(
        &self,
        turns: &[Turn],
        context: Option<&ProjectContext>,
        options: &CompletionOptions,
        stream: Option<StreamCallback>,
    ) -> Result<String> {
        (**self).complete(turns, context, options, stream).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
