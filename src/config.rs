//! Workflow configuration.
//! Loaded from a YAML file (`.workflow-config.yaml` by default); every path in
//! it is relative to the directory holding that file.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_KEYWORDS;
use crate::error::{Error, Result};
use crate::revert::{AmbiguityPolicy, RevertOptions};

fn default_template() -> PathBuf {
    PathBuf::from("template")
}

fn default_profile() -> PathBuf {
    PathBuf::from("profile.yaml")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".workflow-temp")
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|kw| kw.to_string()).collect()
}

fn default_max_history() -> usize {
    5
}

fn default_gitignore() -> PathBuf {
    PathBuf::from(".gitignore")
}

/// Workflow settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default = "default_template")]
    pub template: PathBuf,
    #[serde(default = "default_profile")]
    pub profile: PathBuf,
    #[serde(default)]
    pub overlay_dir: Option<PathBuf>,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Organization keywords that must never appear in the template
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sensitive_dirs: Vec<PathBuf>,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub on_ambiguous: AmbiguityPolicy,
    #[serde(default = "default_gitignore")]
    pub gitignore: PathBuf,

    /// Directory the config file lives in; relative paths resolve against it.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
            profile: default_profile(),
            overlay_dir: None,
            work_dir: default_work_dir(),
            keywords: default_keywords(),
            sensitive_dirs: Vec::new(),
            max_history: default_max_history(),
            exact: false,
            on_ambiguous: AmbiguityPolicy::default(),
            gitignore: default_gitignore(),
            root: PathBuf::from("."),
        }
    }
}

impl WorkflowConfig {
    /// Parses `content` as if it were read from a file in `root`.
    pub fn from_yaml<P: AsRef<Path>>(content: &str, root: P) -> Result<Self> {
        let mut config: WorkflowConfig = if content.trim().is_empty() {
            WorkflowConfig::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| Error::ConfigError(format!("invalid workflow config: {e}")))?
        };
        config.root = root.as_ref().to_path_buf();
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn template_dir(&self) -> PathBuf {
        self.resolve(&self.template)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.resolve(&self.profile)
    }

    pub fn overlay_path(&self) -> Option<PathBuf> {
        self.overlay_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn work_path(&self) -> PathBuf {
        self.resolve(&self.work_dir)
    }

    pub fn gitignore_path(&self) -> PathBuf {
        self.resolve(&self.gitignore)
    }

    /// Concrete tree produced by the injection workflow.
    pub fn private_dir(&self) -> PathBuf {
        self.work_path().join("private")
    }

    /// Reverted tree, before overlay removal and scrubbing.
    pub fn public_dir(&self) -> PathBuf {
        self.work_path().join("public")
    }

    /// Final scrubbed export.
    pub fn export_dir(&self) -> PathBuf {
        self.work_path().join("export")
    }

    pub fn revert_options(&self) -> RevertOptions {
        RevertOptions { exact: self.exact, on_ambiguous: self.on_ambiguous }
    }

    /// JSON form recorded in snapshot metadata.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Loads the workflow config at `path`.
///
/// # Errors
/// * `Error::ConfigError` if the file is missing or does not parse
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<WorkflowConfig> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::ConfigError(format!(
            "workflow config '{}' does not exist",
            path.display()
        )));
    }
    debug!("Loading workflow config from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    WorkflowConfig::from_yaml(&content, root)
}
