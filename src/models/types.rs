use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::constants::{DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE};

/// Project files attached to a request. Built per request, never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectContext {
    /// Root directory the files were read from
    pub root_path: String,
    /// Relative path (forward slashes) to file contents
    pub files: BTreeMap<String, String>,
    truncated: BTreeSet<String>,
}

impl ProjectContext {
    pub fn new(root_path: String) -> Self {
        Self {
            root_path,
            ..Self::default()
        }
    }

    /// Add a file to the context
    pub fn add_file(&mut self, path: String, content: String, truncated: bool) {
        if truncated {
            self.truncated.insert(path.clone());
        } else {
            self.truncated.remove(&path);
        }
        self.files.insert(path, content);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_truncated(&self, path: &str) -> bool {
        self.truncated.contains(path)
    }

    pub fn truncated_files(&self) -> impl Iterator<Item = &str> {
        self.truncated.iter().map(String::as_str)
    }

    /// Format the files as fenced blocks for the system prompt
    pub fn to_prompt_context(&self) -> String {
        self.files
            .iter()
            .map(|(path, content)| {
                let marker = if self.is_truncated(path) { "..." } else { "" };
                format!("File: {}\n```\n{}{}\n```", path, content, marker)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Generation parameters for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub system_prompt: String,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Stream callback type for real-time response streaming
pub type StreamCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_context_marks_truncated_files() {
        let mut context = ProjectContext::new("/project".to_string());
        context.add_file("b.rs".to_string(), "fn b() {}".to_string(), false);
        context.add_file("a.rs".to_string(), "fn a(".to_string(), true);

        assert_eq!(
            context.to_prompt_context(),
            "File: a.rs\n```\nfn a(...\n```\n\nFile: b.rs\n```\nfn b() {}\n```"
        );
    }

    #[test]
    fn test_empty_context_renders_nothing() {
        assert!(ProjectContext::default().to_prompt_context().is_empty());
    }
}
