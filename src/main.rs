//! stencil's main application entry point.
//! Parses arguments, picks the profile fix policy for this terminal and
//! dispatches to the workflows.

use std::io::IsTerminal;

use stencil::{
    cli::{get_args, Args, Command},
    config::{load_config, WorkflowConfig},
    error::{default_error_handler, Error, Result},
    overlay::read_manifest_file,
    prompt::{DialoguerPrompter, FixPolicy},
    snapshot::SnapshotStore,
    validate::{validate_before_workflow, verify_export},
    workflow::Workflow,
};

/// Main application entry point.
fn main() {
    let args = get_args();

    env_logger::Builder::new()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

fn fix_policy(auto_fix: bool) -> FixPolicy {
    if auto_fix {
        FixPolicy::AutoFix
    } else if std::io::stdin().is_terminal() {
        FixPolicy::Interactive
    } else {
        FixPolicy::Strict
    }
}

fn run(args: Args) -> Result<()> {
    let prompter = DialoguerPrompter::new();

    match args.command {
        Command::Inject { dry_run, auto_fix } => {
            let config = load_config(&args.config)?;
            let workflow = Workflow::new(config, fix_policy(auto_fix), &prompter)?;
            let dest = workflow.private_workflow(dry_run)?;
            println!("Concrete tree: '{}'", dest.display());
        }
        Command::Export { dry_run } => {
            let config = load_config(&args.config)?;
            let workflow = Workflow::new(config, FixPolicy::Strict, &prompter)?;
            let export = workflow.public_workflow(dry_run)?;
            println!("Public export: '{}'", export.display());
        }
        Command::Validate { auto_fix } => {
            let report = validate_before_workflow(&args.config, fix_policy(auto_fix), &prompter)?;
            report.log();
            report.into_result()?;
            println!("Validation passed.");
        }
        Command::Verify { template, export, overlay_manifest } => {
            let expected_absent = match overlay_manifest {
                Some(path) => read_manifest_file(&path)?,
                None => Vec::new(),
            };
            let keywords = load_config(&args.config)
                .map(|config| config.keywords)
                .unwrap_or_else(|_| WorkflowConfig::default().keywords);
            let report = verify_export(&template, &export, &expected_absent, &keywords)?;
            report.log();
            report.into_result()?;
            println!("Export matches '{}'.", template.display());
        }
        Command::Rollback { list, to, steps, dry_run } => {
            let config = load_config(&args.config)?;
            let store = SnapshotStore::open(&config.root, config.max_history)?;
            if list {
                for meta in store.list_snapshots()? {
                    println!(
                        "{}  {:<18} {} {}",
                        meta.timestamp, meta.operation, meta.branch, meta.commit
                    );
                }
                return Ok(());
            }
            let restored = match (to, steps) {
                (Some(id), _) => store.rollback_to(&id, dry_run)?,
                (None, steps) => store.rollback_steps(steps.unwrap_or(0), dry_run)?,
            };
            if !restored {
                return Err(Error::SnapshotError("snapshot is missing or damaged".to_string()));
            }
            println!("{}", if dry_run { "Rollback check passed." } else { "Rollback complete." });
        }
    }
    Ok(())
}
