//! `pakt install`: resolve, hoist, and persist the lockfile.

use std::path::PathBuf;

use console::style;
use dialoguer::Select;
use miette::Result;

use pakt_core::pattern::make_pattern;
use pakt_hoister::PackageHoister;
use pakt_util::errors::PaktError;

use super::{build_config, load_project, resolve_project, LOCKFILE_NAME};

const MAX_INTERACTIVE_ROUNDS: usize = 5;

pub async fn exec(
    frozen: bool,
    modules_folder: Option<PathBuf>,
    interactive: bool,
    dry_run: bool,
) -> Result<()> {
    let mut config = build_config(frozen, interactive)?;
    config.modules_folder = modules_folder;

    let mut project = load_project(&config.cwd)?;

    // a resolution conflict may be answered interactively by pinning the
    // offending range and resolving again
    let mut rounds = 0;
    let (resolver, patterns) = loop {
        match resolve_project(&config, &project).await {
            Ok(result) => break result,
            Err(err) if interactive && rounds < MAX_INTERACTIVE_ROUNDS => {
                let conflict = match err.downcast_ref::<PaktError>() {
                    Some(PaktError::Conflict {
                        name,
                        range,
                        available,
                    }) => Some((name.clone(), range.clone(), available.clone())),
                    _ => None,
                };
                let Some((name, range, available)) = conflict else {
                    return Err(err);
                };

                let choice = Select::new()
                    .with_prompt(format!("No version of {name} satisfies {range}; pick one"))
                    .items(&available)
                    .default(0)
                    .interact()
                    .map_err(|e| PaktError::Generic {
                        message: format!("Prompt failed: {e}"),
                    })?;
                let pinned = available[choice].clone();
                project.dependencies.insert(name.clone(), pinned.clone());
                println!(
                    "{} pinned {}",
                    style("→").cyan(),
                    make_pattern(&name, &pinned)
                );
                rounds += 1;
            }
            Err(err) => return Err(err),
        }
    };

    let mut hoister = PackageHoister::new(&config, &resolver);
    hoister.seed(&patterns)?;
    let flat_tree = hoister.init()?;

    for (path, info) in &flat_tree {
        println!(
            "{} {} {}",
            style("+").green(),
            info.manifest.human_id(),
            style(path.display()).dim()
        );
    }
    println!(
        "{} {} packages laid out",
        style("✓").green().bold(),
        flat_tree.len()
    );

    if !dry_run && !frozen {
        let lockfile = resolver.to_lockfile();
        let path = config.cwd.join(LOCKFILE_NAME);
        let text = lockfile.to_string_pretty().map_err(|e| {
            PaktError::Generic {
                message: format!("Failed to serialize lockfile: {e}"),
            }
        })?;
        std::fs::write(&path, text).map_err(PaktError::Io)?;
        tracing::info!("wrote {}", path.display());
    }

    Ok(())
}
