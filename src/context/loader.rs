use ignore::WalkBuilder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{
    BINARY_SNIFF_BYTES, DEFAULT_CONTEXT_MAX_BYTES_PER_FILE, DEFAULT_CONTEXT_MAX_FILES, SKIP_DIRS,
    SOURCE_EXTENSIONS,
};
use crate::models::ProjectContext;
use crate::utils::{AzccError, Result};

/// Configuration for the context loader
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of files to include
    pub max_files: usize,
    /// Files longer than this are cut to exactly this many bytes
    pub max_bytes_per_file: usize,
    /// File extensions loaded before everything else
    pub priority_extensions: Vec<String>,
    /// Directory names never descended into
    pub skip_dirs: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_CONTEXT_MAX_FILES,
            max_bytes_per_file: DEFAULT_CONTEXT_MAX_BYTES_PER_FILE,
            priority_extensions: SOURCE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            skip_dirs: SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Loads project context from the filesystem
#[derive(Debug, Clone, Default)]
pub struct ContextLoader {
    config: LoaderConfig,
}

/// A file read from disk, before it is placed into the context
struct LoadedFile {
    content: String,
    truncated: bool,
}

impl ContextLoader {
    /// Create a new context loader with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load project context using the configured limits
    pub fn load_context(&self, root_path: &Path) -> Result<ProjectContext> {
        self.load(
            root_path,
            self.config.max_files,
            self.config.max_bytes_per_file,
        )
    }

    /// Load up to `max_files` text files under `root_path`, each cut to at
    /// most `max_bytes_per_file` bytes. Binary files are skipped.
    pub fn load(
        &self,
        root_path: &Path,
        max_files: usize,
        max_bytes_per_file: usize,
    ) -> Result<ProjectContext> {
        if !root_path.exists() {
            return Err(AzccError::path(root_path, "directory does not exist"));
        }
        if !root_path.is_dir() {
            return Err(AzccError::path(root_path, "not a directory"));
        }

        let mut context = ProjectContext::new(root_path.to_string_lossy().to_string());

        for file_path in self.collect_files(root_path) {
            if context.len() >= max_files {
                break;
            }

            let loaded = match read_text_file(&file_path, max_bytes_per_file) {
                Ok(Some(loaded)) => loaded,
                Ok(None) => {
                    debug!("Skipping binary file {}", file_path.display());
                    continue;
                }
                Err(e) => {
                    debug!("Skipping unreadable file {}: {}", file_path.display(), e);
                    continue;
                }
            };

            let relative_path = file_path
                .strip_prefix(root_path)
                .unwrap_or(&file_path)
                .to_string_lossy()
                .replace('\\', "/");

            context.add_file(relative_path, loaded.content, loaded.truncated);
        }

        debug!(
            "Loaded {} context files from {} ({} truncated)",
            context.len(),
            root_path.display(),
            context.truncated_files().count()
        );
        Ok(context)
    }

    /// Collect candidate files, source files first, each group in path order
    fn collect_files(&self, root_path: &Path) -> Vec<PathBuf> {
        let mut priority_files = Vec::new();
        let mut other_files = Vec::new();

        let skip_dirs = self.config.skip_dirs.clone();
        let mut walker = WalkBuilder::new(root_path);
        walker
            .standard_filters(true) // Respect .gitignore, .ignore, etc.
            .require_git(false)
            .parents(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                let name = entry.file_name().to_string_lossy();
                !(is_dir && skip_dirs.iter().any(|skip| *skip == name))
            });

        for result in walker.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Walk error under {}: {}", root_path.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.into_path();
            let is_priority = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .is_some_and(|ext| self.config.priority_extensions.contains(&ext));

            if is_priority {
                priority_files.push(path);
            } else {
                other_files.push(path);
            }
        }

        priority_files.extend(other_files);
        priority_files
    }
}

/// Read at most `max_bytes` of a file as text. `Ok(None)` means the file
/// looks binary (a null byte within the first KiB).
fn read_text_file(path: &Path, max_bytes: usize) -> std::io::Result<Option<LoadedFile>> {
    let limit = max_bytes.max(BINARY_SNIFF_BYTES) + 1;
    let mut buf = Vec::new();
    File::open(path)?
        .take(limit as u64)
        .read_to_end(&mut buf)?;

    let sniff = &buf[..buf.len().min(BINARY_SNIFF_BYTES)];
    if sniff.contains(&0) {
        return Ok(None);
    }

    let mut truncated = buf.len() > max_bytes;
    buf.truncate(max_bytes);

    // Replacement characters are wider than the bytes they stand for
    let mut content = decode_text(buf);
    if content.len() > max_bytes {
        content.truncate(floor_char_boundary(&content, max_bytes));
        truncated = true;
    }

    Ok(Some(LoadedFile { content, truncated }))
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    (0..=index.min(text.len()))
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}

fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let utf8 = e.utf8_error();
            let mut bytes = e.into_bytes();
            if utf8.error_len().is_none() {
                // The cut landed inside a multi-byte character
                bytes.truncate(utf8.valid_up_to());
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}
