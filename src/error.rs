//! Error handling for stencil.
//! Defines the crate-wide error type and result alias used by every module.

use thiserror::Error;

/// Errors raised while validating, transforming or restoring a tree.
///
/// Warnings (ambiguous reversion matches, overlay symlinks escaping their root,
/// skipped binary files) are never represented here. They are logged and
/// returned inside the report of the operation that produced them.
#[derive(Error, Debug)]
pub enum Error {
    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] std::io::Error),

    /// Missing or malformed workflow configuration
    #[error("Configuration error: {0}.")]
    ConfigError(String),

    /// A profile line that cannot be parsed
    #[error("Profile syntax error in '{path}' at line {line}: {message}.")]
    ProfileSyntaxError { path: String, line: usize, message: String },

    /// Pre-flight or post-flight validation failed. Carries every violation found.
    #[error("Validation failed with {} error(s):\n{}", .errors.len(), .errors.join("\n"))]
    ValidationError { errors: Vec<String> },

    /// I/O failure while a tree transform was in progress
    #[error("Failed to process '{path}': {source}.")]
    SubstitutionIoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Destination directory '{dest}' already exists.")]
    DestinationExistsError { dest: String },

    #[error("Source directory '{source_dir}' does not exist.")]
    SourceDoesNotExistError { source_dir: String },

    /// Raised only when the ambiguity policy asks for ambiguous matches to be fatal
    #[error("Refused {} ambiguous match(es):\n{}", .matches.len(), .matches.join("\n"))]
    AmbiguousMatchError { matches: Vec<String> },

    #[error("Snapshot error: {0}.")]
    SnapshotError(String),

    #[error("Git error: {0}.")]
    Git2Error(#[from] git2::Error),

    #[error("YAML error: {0}.")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}.")]
    JsonError(#[from] serde_json::Error),

    #[error("Directory walk error: {0}.")]
    WalkDirError(#[from] walkdir::Error),

    #[error("Glob pattern error: {0}.")]
    GlobError(#[from] globset::Error),

    #[error("Prompt error: {0}.")]
    PromptError(String),
}

impl Error {
    /// Wraps an I/O error raised while transforming `path`.
    pub fn substitution<P: AsRef<std::path::Path>>(path: P, source: std::io::Error) -> Self {
        Error::SubstitutionIoError { path: path.as_ref().display().to_string(), source }
    }
}

/// Convenience type alias for Results with stencil's Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - The Error to handle
///
/// # Behavior
/// Prints the error message to stderr and exits with status code 1
pub fn default_error_handler(err: Error) {
    eprintln!("{err}");
    std::process::exit(1);
}
