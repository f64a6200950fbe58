//! Command-line interface for stencil.
//! Provides argument parsing and help text formatting using clap.

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::CONFIG_FILE;

/// Command-line arguments structure for stencil.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "stencil: keep a placeholder template and its concrete twin in sync",
    long_about = None
)]
pub struct Args {
    /// Workflow configuration file
    #[arg(short, long, value_name = "PATH", default_value = CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Validate, then build the concrete tree from the template and profile
    Inject {
        /// Report what would happen without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Fix profile mistakes and append missing keys without asking
        #[arg(long, env = "STENCIL_AUTO_FIX")]
        auto_fix: bool,
    },

    /// Revert the concrete tree, drop the overlay and write the verified export
    Export {
        /// Report what would happen without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the pre-flight checks only
    Validate {
        /// Fix profile mistakes and append missing keys without asking
        #[arg(long, env = "STENCIL_AUTO_FIX")]
        auto_fix: bool,
    },

    /// Compare an exported tree with its template
    Verify {
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        #[arg(value_name = "EXPORT")]
        export: PathBuf,

        /// Overlay manifest listing paths that must be absent from the export
        #[arg(long, value_name = "FILE")]
        overlay_manifest: Option<PathBuf>,
    },

    /// List snapshots or restore one
    Rollback {
        /// List available snapshots, newest first
        #[arg(long, conflicts_with_all = ["to", "steps"])]
        list: bool,

        /// Snapshot id to restore
        #[arg(long, value_name = "ID", conflicts_with = "steps")]
        to: Option<String>,

        /// Restore the snapshot this many steps back (0 is the latest)
        #[arg(long, value_name = "N")]
        steps: Option<usize>,

        /// Check the snapshot without restoring it
        #[arg(long)]
        dry_run: bool,
    },
}

/// Parses command line arguments and returns the Args structure.
///
/// # Returns
/// * `Args` - Parsed command line arguments
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if matches!(
                e.kind(),
                ErrorKind::MissingRequiredArgument
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                    | ErrorKind::MissingSubcommand
            ) {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
