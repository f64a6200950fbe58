//! End-to-end workflows.
//!
//! The private workflow turns the template into the concrete tree under
//! `<work_dir>/private`. The public workflow takes that concrete tree back to
//! placeholder form, strips the overlay, scrubs keyword lines and verifies
//! the result against the template. Both run under a snapshot guard.

use std::path::PathBuf;

use log::{info, warn};

use crate::config::WorkflowConfig;
use crate::error::{Error, Result};
use crate::inject::inject;
use crate::overlay::{read_manifest, remove_overlay};
use crate::placeholder::{find_placeholders, read_ignore_file};
use crate::profile::{load_profile, Profile};
use crate::prompt::{FixPolicy, Prompter};
use crate::revert::revert;
use crate::scrub::{export_directory, scan_directory};
use crate::snapshot::SnapshotStore;
use crate::tree::remove_existing;
use crate::validate::{validate_config, verify_export};

pub struct Workflow<'a> {
    config: WorkflowConfig,
    policy: FixPolicy,
    prompter: &'a dyn Prompter,
    store: SnapshotStore,
}

impl<'a> Workflow<'a> {
    /// Workflow over `config`, with snapshots stored under the config's root.
    pub fn new(config: WorkflowConfig, policy: FixPolicy, prompter: &'a dyn Prompter) -> Result<Self> {
        let store = SnapshotStore::open(&config.root, config.max_history)?;
        Ok(Self::with_store(config, policy, prompter, store))
    }

    pub fn with_store(
        config: WorkflowConfig,
        policy: FixPolicy,
        prompter: &'a dyn Prompter,
        store: SnapshotStore,
    ) -> Self {
        Self { config, policy, prompter, store }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn load_profile(&self) -> Result<Profile> {
        load_profile(self.config.profile_path(), true)
    }

    /// Validates, then injects the template (and overlay) into the private tree.
    ///
    /// # Returns
    /// * `Result<PathBuf>` - The private tree, whether or not it was written
    ///
    /// # Errors
    /// * `Error::ValidationError` when pre-flight validation fails
    /// * Any engine error, after the working tree was rolled back
    pub fn private_workflow(&self, dry_run: bool) -> Result<PathBuf> {
        let report = validate_config(&self.config, self.policy, self.prompter, self.store.vcs())?;
        report.log();
        report.into_result()?;

        let profile = self.load_profile()?;
        let template = self.config.template_dir();
        let overlay = self.config.overlay_path();
        let dest = self.config.private_dir();

        if dry_run {
            let mut ignored = read_ignore_file(&template)?;
            ignored.extend(profile.ignored().iter().cloned());
            let keys = find_placeholders(&template, &ignored)?;
            info!(
                "Dry run: would inject {} placeholder key(s) from '{}' into '{}'{}",
                keys.len(),
                template.display(),
                dest.display(),
                overlay
                    .as_ref()
                    .map(|o| format!(" with overlay '{}'", o.display()))
                    .unwrap_or_default()
            );
            return Ok(dest);
        }

        self.store.run_guarded("private_workflow", self.config.to_json(), || {
            remove_existing(&dest)?;
            inject(&template, &dest, &profile, overlay.as_deref())
        })?;
        info!("Private tree ready at '{}'", dest.display());
        Ok(dest)
    }

    /// Reverts the private tree and produces the verified public export.
    ///
    /// # Returns
    /// * `Result<PathBuf>` - The export directory
    ///
    /// # Errors
    /// * `Error::ConfigError` if the private tree does not exist yet
    /// * `Error::ValidationError` when the export does not match the template
    /// * Any engine error, after the working tree was rolled back
    pub fn public_workflow(&self, dry_run: bool) -> Result<PathBuf> {
        let private = self.config.private_dir();
        if !private.is_dir() {
            return Err(Error::ConfigError(format!(
                "private tree '{}' does not exist; run inject first",
                private.display()
            )));
        }
        let profile = self.load_profile()?;
        let template = self.config.template_dir();
        let overlay = self.config.overlay_path();
        let public = self.config.public_dir();
        let export = self.config.export_dir();

        if dry_run {
            let manifest = read_manifest(&private)?.unwrap_or_default();
            info!(
                "Dry run: would revert '{}' into '{}', drop {} overlay file(s) and export to '{}'",
                private.display(),
                public.display(),
                manifest.len(),
                export.display()
            );
            return Ok(export);
        }

        self.store.run_guarded("public_workflow", self.config.to_json(), || {
            remove_existing(&public)?;
            remove_existing(&export)?;

            revert(&private, &public, &profile, self.config.revert_options())?;
            let removal = remove_overlay(&public, &template, overlay.as_deref(), None)?;
            export_directory(&public, &export, &self.config.keywords)?;

            let report = verify_export(&template, &export, &removal.removed, &self.config.keywords)?;
            report.log();
            report.into_result()?;

            for finding in scan_directory(&export, &self.config.keywords)? {
                warn!("Possible leak: {finding}");
            }
            Ok(())
        })?;
        info!("Public export ready at '{}'", export.display());
        Ok(export)
    }
}
