//! User decisions at the boundary.
//!
//! Core logic never reads the terminal or the environment to decide whether
//! a profile may be rewritten. It receives a [`FixPolicy`] and, for the
//! interactive policy, a [`Prompter`] that the CLI backs with dialoguer.

use dialoguer::Confirm;

use crate::error::{Error, Result};

/// How profile authoring mistakes are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixPolicy {
    /// Every fixable issue is a hard failure.
    #[default]
    Strict,
    /// Ask the prompter before each fix.
    Interactive,
    /// Apply every fix without asking.
    AutoFix,
}

/// Trait for yes/no decisions.
pub trait Prompter {
    /// Asks `prompt`; returns `true` right away when `skip` is set.
    fn confirm(&self, skip: bool, prompt: String) -> Result<bool>;
}

/// Terminal prompter backed by dialoguer.
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl DialoguerPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for DialoguerPrompter {
    fn confirm(&self, skip: bool, prompt: String) -> Result<bool> {
        if skip {
            return Ok(true);
        }
        Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .map_err(|e| Error::PromptError(e.to_string()))
    }
}

/// Prompter for non-interactive contexts; always answers `no` unless skipped.
#[derive(Debug, Default)]
pub struct DeclinePrompter;

impl Prompter for DeclinePrompter {
    fn confirm(&self, skip: bool, _prompt: String) -> Result<bool> {
        Ok(skip)
    }
}

/// Decides whether a fix may be applied under `policy`.
pub fn allow_fix(policy: FixPolicy, prompter: &dyn Prompter, prompt: String) -> Result<bool> {
    match policy {
        FixPolicy::Strict => Ok(false),
        FixPolicy::AutoFix => Ok(true),
        FixPolicy::Interactive => prompter.confirm(false, prompt),
    }
}
