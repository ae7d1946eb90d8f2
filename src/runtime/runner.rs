use colored::Colorize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::constants::EXPLAIN_MAX_CHARS;
use crate::models::{CompletionClient, CompletionOptions, ProjectContext, StreamCallback};
use crate::session::{SessionManager, Turn};
use crate::utils::{render_markdown, AzccError, Result};

/// Sends requests for the command handlers and prints the replies
pub struct Runner<'a> {
    client: &'a dyn CompletionClient,
    options: CompletionOptions,
    stream: bool,
    render_markdown: bool,
}

impl<'a> Runner<'a> {
    pub fn new(client: &'a dyn CompletionClient, options: CompletionOptions) -> Self {
        Self {
            client,
            options,
            stream: true,
            render_markdown: true,
        }
    }

    /// Print text fragments as they arrive instead of the final reply
    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Style non-streamed replies as markdown
    pub fn with_markdown(mut self, render_markdown: bool) -> Self {
        self.render_markdown = render_markdown;
        self
    }

    /// One-shot question. Earlier history is not sent; the exchange is
    /// recorded once the reply arrives.
    pub async fn ask(
        &self,
        session: &mut SessionManager,
        prompt: &str,
        context: Option<&ProjectContext>,
    ) -> Result<String> {
        let question = Turn::user(prompt);
        let reply = self.respond(std::slice::from_ref(&question), context).await?;

        session.append(question);
        session.append(Turn::assistant(reply.clone()));
        Ok(reply)
    }

    /// Continue the conversation with `text`, sending the retained history.
    /// The session only changes if the backend answers.
    pub async fn continue_conversation(
        &self,
        session: &mut SessionManager,
        text: &str,
        context: Option<&ProjectContext>,
    ) -> Result<String> {
        let mut pending = session.clone();
        let reply = self.respond(pending.continue_with(text), context).await?;

        pending.append(Turn::assistant(reply.clone()));
        *session = pending;
        Ok(reply)
    }

    /// Ask for an explanation of a source file. Not recorded in history.
    pub async fn explain(&self, file: &Path, context: Option<&ProjectContext>) -> Result<String> {
        let prompt = explain_prompt(file)?;
        self.respond(&[Turn::user(prompt)], context).await
    }

    async fn respond(&self, turns: &[Turn], context: Option<&ProjectContext>) -> Result<String> {
        info!(
            backend = self.client.name(),
            turns = turns.len(),
            context_files = context.map_or(0, ProjectContext::len),
            "Requesting completion"
        );

        if self.stream {
            let callback: StreamCallback = Arc::new(|chunk: &str| {
                print!("{}", chunk);
                let _ = std::io::stdout().flush();
            });
            let reply = self
                .client
                .complete(turns, context, &self.options, Some(callback))
                .await;
            println!();
            reply
        } else {
            let reply = self
                .client
                .complete(turns, context, &self.options, None)
                .await?;
            if self.render_markdown {
                println!("{}", render_markdown(&reply));
            } else {
                println!("{}", reply);
            }
            Ok(reply)
        }
    }
}

/// Build the explain prompt, truncating very large files
fn explain_prompt(file: &Path) -> Result<String> {
    let code = fs::read_to_string(file).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AzccError::path(file, "file does not exist"),
        _ => AzccError::io(file, e),
    })?;

    let code = if code.chars().count() > EXPLAIN_MAX_CHARS {
        eprintln!(
            "{}",
            format!(
                "File is very large, truncating to first {} characters for analysis.",
                EXPLAIN_MAX_CHARS
            )
            .yellow()
        );
        let head: String = code.chars().take(EXPLAIN_MAX_CHARS).collect();
        format!("{}\n...\n(file truncated)", head)
    } else {
        code
    };

    Ok(format!("Explain this code concisely:\n```\n{}\n```", code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers with a canned reply and records what it was sent
    struct EchoClient {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl EchoClient {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<Vec<String>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(
            &self,
            turns: &[Turn],
            _context: Option<&ProjectContext>,
            _options: &CompletionOptions,
            stream: Option<StreamCallback>,
        ) -> Result<String> {
            self.seen
                .lock()
                .unwrap()
                .push(turns.iter().map(|t| t.text().to_string()).collect());
            match &self.reply {
                Ok(reply) => {
                    if let Some(callback) = stream {
                        callback(reply);
                    }
                    Ok(reply.clone())
                }
                Err(message) => Err(AzccError::Backend(message.clone())),
            }
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn runner(client: &EchoClient) -> Runner<'_> {
        Runner::new(client, CompletionOptions::default())
            .with_streaming(false)
            .with_markdown(false)
    }

    #[tokio::test]
    async fn test_ask_sends_only_the_prompt_and_records_exchange() {
        let client = EchoClient::ok("42");
        let mut session = SessionManager::with_turns(vec![Turn::user("old"), Turn::assistant("older")], 10);

        let reply = runner(&client).ask(&mut session, "meaning?", None).await.unwrap();

        assert_eq!(reply, "42");
        assert_eq!(client.sent(), vec![vec!["meaning?".to_string()]]);
        let texts: Vec<&str> = session.history().iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["old", "older", "meaning?", "42"]);
    }

    #[tokio::test]
    async fn test_continue_sends_history() {
        let client = EchoClient::ok("sure");
        let mut session = SessionManager::with_turns(vec![Turn::user("q1"), Turn::assistant("a1")], 10);

        runner(&client)
            .continue_conversation(&mut session, "q2", None)
            .await
            .unwrap();

        assert_eq!(client.sent(), vec![vec!["q1".to_string(), "a1".to_string(), "q2".to_string()]]);
        assert_eq!(session.len(), 4);
        assert_eq!(session.last().unwrap().text(), "sure");
    }

    #[tokio::test]
    async fn test_failed_continue_leaves_session_untouched() {
        let client = EchoClient::failing("boom");
        let mut session = SessionManager::with_turns(vec![Turn::user("q1"), Turn::assistant("a1")], 10);
        let before = session.history().to_vec();

        let err = runner(&client)
            .continue_conversation(&mut session, "q2", None)
            .await
            .unwrap_err();

        assert!(matches!(err, AzccError::Backend(_)));
        assert_eq!(session.history(), before.as_slice());
    }

    #[tokio::test]
    async fn test_streaming_reply_is_returned() {
        let client = EchoClient::ok("streamed");
        let mut session = SessionManager::new(10);

        let reply = Runner::new(&client, CompletionOptions::default())
            .ask(&mut session, "go", None)
            .await
            .unwrap();
        assert_eq!(reply, "streamed");
    }

    #[tokio::test]
    async fn test_explain_missing_file_is_path_error() {
        let client = EchoClient::ok("unused");
        let err = runner(&client)
            .explain(Path::new("/no/such/file.rs"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AzccError::Path { .. }));
        assert!(client.sent().is_empty());
    }

    #[test]
    fn test_explain_prompt_truncates_large_files() {
        let dir = TempDir::new().unwrap();
        let small = dir.path().join("small.rs");
        fs::write(&small, "fn main() {}").unwrap();
        assert_eq!(
            explain_prompt(&small).unwrap(),
            "Explain this code concisely:\n```\nfn main() {}\n```"
        );

        let big = dir.path().join("big.rs");
        fs::write(&big, "a".repeat(EXPLAIN_MAX_CHARS + 10)).unwrap();
        let prompt = explain_prompt(&big).unwrap();
        assert!(prompt.contains(&format!("{}\n...\n(file truncated)", "a".repeat(EXPLAIN_MAX_CHARS))));
        assert!(!prompt.contains(&"a".repeat(EXPLAIN_MAX_CHARS + 1)));
    }
}
