//! Common constants used throughout stencil.

/// Default workflow configuration file name
pub const CONFIG_FILE: &str = ".workflow-config.yaml";

/// Per-tree list of placeholder keys exempt from completeness checks
pub const PLACEHOLDER_IGNORE_FILE: &str = ".placeholderignore";

/// Sidecar written under a concrete tree listing the files an overlay contributed
pub const OVERLAY_MANIFEST_FILE: &str = ".overlay_manifest";

/// Snapshot storage directory, relative to the tracked tree root
pub const SNAPSHOT_DIR: &str = ".workflow-rollbacks";
pub const SNAPSHOT_METADATA_FILE: &str = "metadata.json";
pub const SNAPSHOT_GIT_STATE_FILE: &str = "git-state.json";
pub const SNAPSHOT_FILES_DIR: &str = "files";

/// Profile key holding placeholder keys to exempt from completeness checks
pub const PROFILE_IGNORE_KEY: &str = "ignore_placeholders";

/// Number of leading bytes inspected by the text/binary classifier
pub const SAMPLE_SIZE: usize = 2048;

/// Share of non-printable bytes above which a sample counts as binary
pub const NON_TEXT_RATIO: f64 = 0.3;

/// Profile values longer than this are reported as suspicious
pub const MAX_VALUE_LENGTH: usize = 300;

/// Value written for keys appended automatically to a profile
pub const APPEND_SENTINEL: &str = "TODO";

/// Extensions that are always treated as text.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "py", "pyi", "robot", "yaml", "yml", "md", "txt", "toml", "sh", "ps1", "gitignore",
    "dockerignore", "in", "example", "validate", "excalidraw", "log", "json", "xml", "ini",
    "cfg", "conf", "rs", "js", "ts", "html", "css", "csv", "rst", "c", "h", "cpp", "hpp",
    "java", "go", "bat", "env",
];

/// Extensions that are never treated as text, whatever their content looks like.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "bin", "exe", "dll", "so", "dylib", "o", "a", "lib", "obj", "elf", "img", "iso",
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "tiff", "pdf", "zip", "gz", "tgz",
    "bz2", "xz", "7z", "rar", "tar", "jar", "whl", "pyc", "pyo", "class", "mp3", "mp4",
    "wav", "avi", "mov", "ttf", "otf", "woff", "woff2", "db", "sqlite",
];

/// Python-like source files, where placeholders in declarations get identifier treatment.
pub const SOURCE_EXTENSIONS: &[&str] = &["py", "pyi"];

/// Ordinary words that look like placeholders when upper-cased in prose.
pub const COMMON_WORDS: &[&str] = &[
    "and", "the", "for", "with", "from", "this", "that", "not", "but", "are", "you", "all",
    "any", "can", "has", "have", "was", "were", "will", "your", "our", "its", "into", "then",
    "else", "when", "what", "which", "who", "how", "why", "yes", "none", "null", "true",
    "false", "name", "type", "data", "item", "self",
];

/// Substrings marking test fixtures rather than real placeholders.
pub const SENTINEL_SUBSTRINGS: &[&str] = &["TEST", "EMPTY", "DUMMY", "EXAMPLE", "TODO"];

/// Names too generic to be trusted as placeholders.
pub const GENERIC_NAMES: &[&str] = &["TOKEN", "KEY", "VALUE", "SECRET"];

/// Profile values that mean "not filled in yet".
pub const SENTINEL_VALUES: &[&str] = &["TODO", "FIXME"];

/// Words the identifier sanitizer must not emit bare.
pub const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Prefix applied to sanitized identifiers that collide with a reserved word
pub const RESERVED_PREFIX: &str = "var_";

/// Identifier emitted when a value sanitizes to nothing
pub const FALLBACK_IDENTIFIER: &str = "unnamed";

/// Organization keywords that must never appear in a template or export.
pub const DEFAULT_KEYWORDS: &[&str] =
    &["YourCompany", "MY_ORGANIZATION_NAME", "@company.com", "embedded-test-team@"];
