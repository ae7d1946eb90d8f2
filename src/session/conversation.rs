use clap::ValueEnum;
use std::fs;
use std::path::Path;

use super::turn::{Role, Turn};
use crate::utils::{AzccError, Result};

/// On-disk formats understood by [`SessionManager::export`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// One JSON object per line
    #[default]
    Jsonl,
    /// A pretty-printed JSON array
    Json,
    /// Human-readable transcript (cannot be imported back)
    Markdown,
}

/// Owns the ordered, bounded turn history of one conversation
#[derive(Debug, Clone)]
pub struct SessionManager {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl SessionManager {
    /// Create an empty session retaining at most `max_turns` turns (minimum 1)
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// Create a session seeded with previously recorded turns
    pub fn with_turns(turns: impl IntoIterator<Item = Turn>, max_turns: usize) -> Self {
        let mut session = Self::new(max_turns);
        for turn in turns {
            session.append(turn);
        }
        session
    }

    /// Append a turn, evicting the oldest turns once over the limit
    pub fn append(&mut self, turn: Turn) {
        let turn = match self.turns.last() {
            Some(last) => turn.not_before(last.timestamp()),
            None => turn,
        };
        self.turns.push(turn);

        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(0..excess);
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    /// Record a user turn and return the turns to send to the backend
    pub fn continue_with(&mut self, user_text: impl Into<String>) -> &[Turn] {
        self.append(Turn::user(user_text));
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Write the full history to `path`
    pub fn export(&self, path: &Path, format: ExportFormat) -> Result<()> {
        let body = match format {
            ExportFormat::Jsonl => encode_jsonl(&self.turns)?,
            ExportFormat::Json => serde_json::to_string_pretty(&self.turns)?,
            ExportFormat::Markdown => render_transcript(&self.turns),
        };
        fs::write(path, body).map_err(|e| AzccError::io(path, e))
    }

    /// Read turns back from a JSON Lines or JSON export
    pub fn import(path: &Path) -> Result<Vec<Turn>> {
        let raw = fs::read_to_string(path).map_err(|e| AzccError::io(path, e))?;
        decode_turns(&raw)
    }
}

pub(crate) fn encode_jsonl(turns: &[Turn]) -> Result<String> {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&serde_json::to_string(turn)?);
        out.push('\n');
    }
    Ok(out)
}

/// Decode either a JSON array or JSON Lines, failing on the first bad record
fn decode_turns(raw: &str) -> Result<Vec<Turn>> {
    if raw.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(raw)?);
    }

    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(AzccError::from))
        .collect()
}

fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::from("# azcc conversation\n");
    for turn in turns {
        let speaker = match turn.role() {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        out.push_str(&format!(
            "\n## {} ({})\n\n{}\n",
            speaker,
            turn.timestamp().format("%Y-%m-%d %H:%M:%S"),
            turn.text()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn numbered(n: usize) -> Vec<Turn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("question {i}"))
                } else {
                    Turn::assistant(format!("answer {i}"))
                }
            })
            .collect()
    }

    #[test]
    fn test_append_evicts_oldest_beyond_max() {
        let turns = numbered(25);
        let mut session = SessionManager::new(10);
        for turn in turns.iter().cloned() {
            session.append(turn);
        }

        assert_eq!(session.len(), 10);
        let texts: Vec<&str> = session.history().iter().map(Turn::text).collect();
        let expected: Vec<&str> = turns[15..].iter().map(Turn::text).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn test_append_under_limit_keeps_everything() {
        let session = SessionManager::with_turns(numbered(3), 10);
        assert_eq!(session.len(), 3);
        assert_eq!(session.history()[0].text(), "question 0");
    }

    #[test]
    fn test_zero_limit_is_raised_to_one() {
        let mut session = SessionManager::new(0);
        assert_eq!(session.max_turns(), 1);
        session.append(Turn::user("a"));
        session.append(Turn::user("b"));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].text(), "b");
    }

    #[test]
    fn test_timestamps_stay_monotonic() {
        let now = chrono::Local::now();
        let mut session = SessionManager::new(5);
        session.append(Turn::with_timestamp(Role::User, "late", now));
        session.append(Turn::with_timestamp(
            Role::Assistant,
            "skewed",
            now - chrono::Duration::minutes(3),
        ));

        let history = session.history();
        assert!(history[0].timestamp() <= history[1].timestamp());
        assert_eq!(history[1].text(), "skewed");
    }

    #[test]
    fn test_continue_with_returns_full_history() {
        let mut session = SessionManager::new(4);
        session.append(Turn::user("first"));
        session.append(Turn::assistant("reply"));

        let sent = session.continue_with("second");
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].role(), Role::User);
        assert_eq!(sent[2].text(), "second");
    }

    #[test]
    fn test_clear_empties_history() {
        let mut session = SessionManager::with_turns(numbered(4), 10);
        session.clear();
        assert!(session.history().is_empty());
        assert!(session.is_empty());
    }

    #[test]
    fn test_export_jsonl_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let session = SessionManager::with_turns(numbered(6), 10);

        session.export(&path, ExportFormat::Jsonl).unwrap();
        let reloaded = SessionManager::import(&path).unwrap();

        assert_eq!(reloaded, session.history().to_vec());
    }

    #[test]
    fn test_export_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let session = SessionManager::with_turns(numbered(3), 10);

        session.export(&path, ExportFormat::Json).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.trim_start().starts_with('['));

        assert_eq!(SessionManager::import(&path).unwrap(), session.history().to_vec());
    }

    #[test]
    fn test_export_markdown_transcript() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.md");
        let session = SessionManager::with_turns(vec![Turn::user("why?"), Turn::assistant("because")], 10);

        session.export(&path, ExportFormat::Markdown).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("## User ("));
        assert!(raw.contains("why?"));
        assert!(raw.contains("## Assistant ("));
    }

    #[test]
    fn test_export_to_unwritable_path_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("out.jsonl");
        let session = SessionManager::with_turns(numbered(1), 10);

        let err = session.export(&path, ExportFormat::Jsonl).unwrap_err();
        assert!(matches!(err, AzccError::Io { .. }), "{err:?}");
    }
}
