//! stencil keeps a template tree with `{{ KEY }}` placeholders and a concrete
//! tree with real values in sync, in both directions.
//! It provides injection, reversion, overlay handling, validation and
//! snapshot-based rollback around those transformations.

/// Binary/text classification of files
pub mod classify;

/// Command-line interface module for the stencil application
pub mod cli;

/// Workflow configuration (.workflow-config.yaml)
pub mod config;

/// Reserved file names and fixed word lists
pub mod constants;

/// Error types and handling for the stencil application
pub mod error;

/// Identifier sanitization for class and function names
pub mod identifier;

/// Template to concrete substitution
pub mod inject;

/// Overlay merging, manifests and removal
pub mod overlay;

/// Placeholder token grammar and discovery
/// Honors .placeholderignore files
pub mod placeholder;

/// Profile loading, validation and in-place fixes
pub mod profile;

/// User decisions: fix policy and prompting
pub mod prompt;

/// Concrete to template reversion
pub mod revert;

/// Keyword scrubbing and leak scanning for exports
pub mod scrub;

/// Snapshots of tracked files and rollback
/// Stored under .workflow-rollbacks
pub mod snapshot;

/// Tree enumeration and copy helpers
pub mod tree;

/// Pre-flight and post-flight validation
pub mod validate;

/// Version control capability and its Git backend
pub mod vcs;

/// Private and public workflows
pub mod workflow;
