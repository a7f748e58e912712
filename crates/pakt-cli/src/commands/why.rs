//! `pakt why`: explain why a package is installed.

use console::style;
use miette::Result;

use pakt_resolver::graph::DependencyGraph;
use pakt_util::errors::PaktError;

use super::{build_config, load_project, resolve_project};

pub async fn exec(package: &str) -> Result<()> {
    let config = build_config(false, false)?;
    let project = load_project(&config.cwd)?;
    let (resolver, patterns) = resolve_project(&config, &project).await?;

    let name = if project.name.is_empty() {
        "project".to_string()
    } else {
        project.name.clone()
    };
    let version = if project.version.is_empty() {
        "0.0.0".to_string()
    } else {
        project.version.clone()
    };
    let graph = DependencyGraph::build(&resolver, &name, &version, &patterns);

    let Some(path) = graph.find_path(package) else {
        return Err(PaktError::Resolution {
            message: format!("{package} is not part of the dependency graph"),
        }
        .into());
    };

    let chain: Vec<String> = path.iter().map(|node| node.to_string()).collect();
    println!("{} {}", style("path:").bold(), chain.join(" > "));
    println!();
    print!("{}", graph.print_inverted_tree(package));
    Ok(())
}
