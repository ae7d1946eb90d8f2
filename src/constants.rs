/// Constants module to avoid magic numbers in the codebase

// Azure OpenAI
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4";
pub const DEFAULT_API_VERSION: &str = "2023-05-15";

// Timeouts & retries
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
pub const MAX_BACKOFF_MS: u64 = 30_000;

// Default Model Configuration
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MAX_TEMPERATURE: f32 = 2.0;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are AzureCC, a command-line AI assistant specialized in helping with code. \
Provide concise, practical responses focused on code solutions. \
Use markdown for formatting. For code, always specify the language. \
When explaining code, be clear and brief.";

// History
pub const DEFAULT_HISTORY_FILE_NAME: &str = ".azcc_history";
pub const DEFAULT_MAX_HISTORY: usize = 10;

// Context loading
pub const DEFAULT_CONTEXT_MAX_FILES: usize = 5;
pub const DEFAULT_CONTEXT_MAX_BYTES_PER_FILE: usize = 1000;
pub const BINARY_SNIFF_BYTES: usize = 1024;

// `explain` truncates the file to this many characters
pub const EXPLAIN_MAX_CHARS: usize = 4000;

/// Extensions loaded ahead of everything else when building context
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "java", "cpp", "h", "cs", "go", "rs", "ts", "html", "css",
];

/// Directories never descended into when building context
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    ".git",
    ".svn",
    ".hg",
    "venv",
    ".venv",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".tox",
    "vendor",
    ".idea",
    ".vscode",
    "coverage",
    ".gradle",
    ".cargo",
];
